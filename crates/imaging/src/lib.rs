pub mod document;
pub mod enhance;
pub mod quality;

pub use document::{DocumentImage, ImagingError};
pub use enhance::{enhance, EnhancementResult};
pub use quality::assess;
