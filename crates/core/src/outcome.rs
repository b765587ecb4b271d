use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::field::{ExtractedField, FieldName};
use crate::metric::QualityReport;
use crate::severity::{Decision, MismatchSeverity, RiskTier};

/// Corrective transforms the enhancer can apply, in their fixed pipeline
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementOp {
    RotationCorrect,
    PerspectiveCorrect,
    ContrastEnhance,
    Denoise,
    BrightnessNormalize,
}

impl fmt::Display for EnhancementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnhancementOp::RotationCorrect => write!(f, "rotation_correct"),
            EnhancementOp::PerspectiveCorrect => write!(f, "perspective_correct"),
            EnhancementOp::ContrastEnhance => write!(f, "contrast_enhance"),
            EnhancementOp::Denoise => write!(f, "denoise"),
            EnhancementOp::BrightnessNormalize => write!(f, "brightness_normalize"),
        }
    }
}

/// The image-free half of an enhancement result, embedded in the
/// per-document record consumed by reporting collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementSummary {
    pub operations_applied: Vec<EnhancementOp>,
    /// Quality report recomputed on the enhanced image.
    pub enhanced_quality: QualityReport,
}

/// One field-level comparison between two documents. Fields present on only
/// one side are reported RED with the absent side as `None`, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchRecord {
    pub field: FieldName,
    pub value_a: Option<String>,
    pub value_b: Option<String>,
    /// Symmetric similarity in [0, 1].
    pub similarity: f64,
    pub severity: MismatchSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The tiered decision plus every factor that caused its rule to fire, in
/// the order the rule table examined them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub decision: Decision,
    pub factors: Vec<String>,
}

/// The complete per-document result record: quality of the raw image,
/// enhancement summary, extracted fields and aggregate OCR confidence.
/// Produced once per verification session; persistence belongs to external
/// consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub quality: QualityReport,
    pub enhancement: EnhancementSummary,
    pub fields: BTreeMap<FieldName, ExtractedField>,
    pub ocr_confidence: f64,
}
