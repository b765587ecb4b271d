pub mod config;
pub mod field;
pub mod metric;
pub mod outcome;
pub mod severity;

pub use config::{
    ConfigError, FieldBands, InverseBand, MetricBand, OcrSettings, QualityThresholds,
    RiskThresholds, SimilarityThresholds, VerifyConfig, WindowBand,
};
pub use field::{ExtractedField, ExtractedFields, FieldName};
pub use metric::{MetricName, QualityMetric, QualityReport};
pub use outcome::{
    DocumentRecord, EnhancementOp, EnhancementSummary, MismatchRecord, RiskAssessment,
};
pub use severity::{Decision, MismatchSeverity, QualityLevel, RiskTier, Severity};
