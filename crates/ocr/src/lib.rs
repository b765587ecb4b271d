pub mod checksum;
pub mod extract;
pub mod recognizer;

pub use checksum::{abn_valid, acn_valid};
pub use extract::FieldExtractor;
pub use recognizer::{tokens_from_text, BoundingBox, MockBackend, OcrBackend, OcrError, OcrToken};
