use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::field::FieldName;
use crate::severity::Severity;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Threshold band for a higher-is-better measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBand {
    /// Values strictly below this are RED.
    pub red_below: f64,
    /// Values at or above this are GREEN; between the two, YELLOW.
    pub green_at: f64,
}

impl MetricBand {
    pub fn classify(&self, value: f64) -> Severity {
        if value < self.red_below {
            Severity::Red
        } else if value >= self.green_at {
            Severity::Green
        } else {
            Severity::Yellow
        }
    }
}

/// Threshold band for a lower-is-better measurement (skew degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseBand {
    /// Values at or above this are YELLOW.
    pub yellow_at: f64,
    /// Values at or above this are RED.
    pub red_at: f64,
}

impl InverseBand {
    pub fn classify(&self, value: f64) -> Severity {
        if value >= self.red_at {
            Severity::Red
        } else if value >= self.yellow_at {
            Severity::Yellow
        } else {
            Severity::Green
        }
    }
}

/// Two nested acceptance windows for a measurement with an optimal middle
/// range (mean luminance). Outside the hard window is RED, outside the soft
/// window YELLOW, inside both GREEN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBand {
    pub hard_low: f64,
    pub soft_low: f64,
    pub soft_high: f64,
    pub hard_high: f64,
}

impl WindowBand {
    pub fn classify(&self, value: f64) -> Severity {
        if value < self.hard_low || value > self.hard_high {
            Severity::Red
        } else if value < self.soft_low || value > self.soft_high {
            Severity::Yellow
        } else {
            Severity::Green
        }
    }
}

/// Per-field similarity cut lines: similarity >= `green` is no mismatch,
/// >= `yellow` a YELLOW mismatch, below that RED.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBands {
    pub green: f64,
    pub yellow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub dpi: MetricBand,
    pub contrast: MetricBand,
    pub rotation: InverseBand,
    /// Bands over the combined (worst-of-three) blur score. The cut lines
    /// are configuration, not constants: recalibrate against a labeled
    /// corpus without touching code.
    pub blur: MetricBand,
    pub brightness: WindowBand,
    /// Bounded slack added to the worst RED metric when flooring the
    /// aggregate score.
    pub red_slack: f64,
    /// Images smaller than this on either side are degenerate.
    pub min_dimension: u32,
    /// Assumed physical page width in inches for the DPI estimate
    /// (A4 portrait). No EXIF is consulted; the estimate is a proxy, not
    /// ground truth.
    pub page_width_inches: f64,
    /// DPI at which the normalized score reaches 100.
    pub dpi_score_ceiling: f64,
    /// Skew in degrees at which the rotation score reaches 0.
    pub rotation_score_floor: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            dpi: MetricBand { red_below: 100.0, green_at: 200.0 },
            contrast: MetricBand { red_below: 60.0, green_at: 75.0 },
            rotation: InverseBand { yellow_at: 1.0, red_at: 5.0 },
            blur: MetricBand { red_below: 30.0, green_at: 60.0 },
            brightness: WindowBand {
                hard_low: 30.0,
                soft_low: 50.0,
                soft_high: 200.0,
                hard_high: 225.0,
            },
            red_slack: 10.0,
            min_dimension: 50,
            page_width_inches: 8.27,
            dpi_score_ceiling: 300.0,
            rotation_score_floor: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityThresholds {
    pub name: FieldBands,
    pub date_of_birth: FieldBands,
    pub address: FieldBands,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            name: FieldBands { green: 0.85, yellow: 0.60 },
            date_of_birth: FieldBands { green: 1.0, yellow: 0.75 },
            address: FieldBands { green: 0.80, yellow: 0.55 },
        }
    }
}

impl SimilarityThresholds {
    /// Bands for a field. Exact-match fields are binary, so any band with
    /// green at 1.0 behaves correctly for them.
    pub fn for_field(&self, field: FieldName) -> FieldBands {
        match field {
            FieldName::Name => self.name,
            FieldName::DateOfBirth => self.date_of_birth,
            FieldName::Address => self.address,
            FieldName::Postcode | FieldName::Abn | FieldName::Acn => {
                FieldBands { green: 1.0, yellow: 1.0 }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Minimum aggregate OCR confidence below which the session is rejected.
    pub reject_below: f64,
    /// Minimum aggregate OCR confidence below which the session escalates.
    pub escalate_below: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { reject_below: 50.0, escalate_below: 75.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Wall-clock budget for a single engine call. On timeout the document
    /// is reported with a zero-confidence extraction instead of stalling
    /// the batch.
    pub timeout_ms: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

/// The immutable configuration value threaded through every component call.
/// Loaded once at startup; defaults carry the shipped threshold tables and
/// a TOML file may override any subset of them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub quality: QualityThresholds,
    pub similarity: SimilarityThresholds,
    pub risk: RiskThresholds,
    pub ocr: OcrSettings,
}

impl VerifyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
