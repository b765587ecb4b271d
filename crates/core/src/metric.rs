use serde::{Deserialize, Serialize};
use std::fmt;

use crate::severity::{QualityLevel, Severity};

/// The five quality dimensions measured on every document image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Dpi,
    Contrast,
    Rotation,
    Blur,
    Brightness,
}

impl MetricName {
    /// Canonical report order.
    pub const ALL: [MetricName; 5] = [
        MetricName::Dpi,
        MetricName::Contrast,
        MetricName::Rotation,
        MetricName::Blur,
        MetricName::Brightness,
    ];
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricName::Dpi => write!(f, "dpi"),
            MetricName::Contrast => write!(f, "contrast"),
            MetricName::Rotation => write!(f, "rotation"),
            MetricName::Blur => write!(f, "blur"),
            MetricName::Brightness => write!(f, "brightness"),
        }
    }
}

/// One measured quality dimension: the raw value, its normalized score and
/// the severity that the threshold table assigns to the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub name: MetricName,
    /// Raw measurement in the metric's own unit (dpi, degrees, luma, ...).
    pub value: f64,
    /// Normalized score, clamped to [0, 100].
    pub score: f64,
    pub severity: Severity,
}

impl QualityMetric {
    pub fn new(name: MetricName, value: f64, score: f64, severity: Severity) -> Self {
        Self { name, value, score: score.clamp(0.0, 100.0), severity }
    }
}

/// Immutable per-image quality report: one metric per dimension plus the
/// aggregate score and level. Produced once per image version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Metrics in `MetricName::ALL` order.
    pub metrics: Vec<QualityMetric>,
    /// Aggregate score in [0, 100].
    pub score: f64,
    pub level: QualityLevel,
    /// Set when a metric had to be computed from fewer estimators than
    /// designed (tiny images). The report is still usable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl QualityReport {
    /// Build a report from per-metric results, applying the red-floor rule:
    /// the aggregate is the equal-weight mean unless a metric is RED, in
    /// which case the aggregate may not exceed that metric's score plus
    /// `red_slack` (a catastrophic defect cannot be averaged away).
    pub fn from_metrics(metrics: Vec<QualityMetric>, red_slack: f64, degraded: bool) -> Self {
        let mean = if metrics.is_empty() {
            0.0
        } else {
            metrics.iter().map(|m| m.score).sum::<f64>() / metrics.len() as f64
        };

        let score = match metrics
            .iter()
            .filter(|m| m.severity == Severity::Red)
            .map(|m| m.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
        {
            Some(worst_red) => mean.min(worst_red + red_slack).clamp(0.0, 100.0),
            None => mean,
        };

        let level = QualityLevel::from_score(score);
        Self { metrics, score, level, degraded }
    }

    pub fn metric(&self, name: MetricName) -> Option<&QualityMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Severity of a named metric; missing metrics read as RED so a caller
    /// never treats an unmeasured dimension as compliant.
    pub fn severity_of(&self, name: MetricName) -> Severity {
        self.metric(name).map_or(Severity::Red, |m| m.severity)
    }

    pub fn all_green(&self) -> bool {
        self.metrics.iter().all(|m| m.severity == Severity::Green)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: MetricName, score: f64, severity: Severity) -> QualityMetric {
        QualityMetric::new(name, score, score, severity)
    }

    #[test]
    fn score_is_clamped() {
        let m = QualityMetric::new(MetricName::Blur, 1.0, 150.0, Severity::Green);
        assert_eq!(m.score, 100.0);
        let m = QualityMetric::new(MetricName::Blur, 1.0, -5.0, Severity::Red);
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn aggregate_is_mean_when_no_red() {
        let report = QualityReport::from_metrics(
            vec![
                metric(MetricName::Dpi, 80.0, Severity::Green),
                metric(MetricName::Contrast, 90.0, Severity::Green),
            ],
            10.0,
            false,
        );
        assert!((report.score - 85.0).abs() < 1e-9);
        assert_eq!(report.level, QualityLevel::Good);
    }

    #[test]
    fn red_metric_floors_the_aggregate() {
        // Four perfect metrics cannot average away one catastrophic defect.
        let report = QualityReport::from_metrics(
            vec![
                metric(MetricName::Dpi, 100.0, Severity::Green),
                metric(MetricName::Contrast, 100.0, Severity::Green),
                metric(MetricName::Rotation, 100.0, Severity::Green),
                metric(MetricName::Brightness, 100.0, Severity::Green),
                metric(MetricName::Blur, 10.0, Severity::Red),
            ],
            10.0,
            false,
        );
        assert!(report.score <= 20.0, "score was {}", report.score);
        assert_eq!(report.level, QualityLevel::Poor);
    }

    #[test]
    fn worst_red_wins_when_several() {
        let report = QualityReport::from_metrics(
            vec![
                metric(MetricName::Dpi, 40.0, Severity::Red),
                metric(MetricName::Blur, 5.0, Severity::Red),
                metric(MetricName::Contrast, 100.0, Severity::Green),
            ],
            10.0,
            false,
        );
        assert!(report.score <= 15.0, "score was {}", report.score);
    }

    #[test]
    fn empty_metrics_score_zero() {
        let report = QualityReport::from_metrics(vec![], 10.0, false);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.level, QualityLevel::Poor);
    }

    #[test]
    fn missing_metric_reads_red() {
        let report = QualityReport::from_metrics(vec![], 10.0, false);
        assert_eq!(report.severity_of(MetricName::Rotation), Severity::Red);
    }
}
