pub mod mismatch;
pub mod pipeline;
pub mod risk;
pub mod similarity;

pub use mismatch::{MismatchDetector, MismatchInputError};
pub use pipeline::{
    BatchOutcome, PipelineError, VerificationOutcome, VerificationPipeline, SUPPORTED_EXTENSIONS,
};
pub use risk::RiskAssessor;
pub use similarity::field_similarity;
