use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
}

/// Pixel-space location of a recognized token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center_y(&self) -> f64 {
        self.y as f64 + self.height as f64 / 2.0
    }
}

/// One recognized text token with its geometry and per-token confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    pub bbox: BoundingBox,
    /// Confidence in [0, 100].
    pub confidence: f64,
}

/// Abstraction over an external OCR engine. Implementations accept PNG
/// image bytes and return the recognized tokens in reading order. The
/// engine itself is stateless per call; acquisition happens once per batch
/// via `ensure_available`.
pub trait OcrBackend: Send + Sync {
    /// Probe the engine before any document is processed. A missing or
    /// misconfigured engine must fail here, not mid-batch.
    fn ensure_available(&self) -> Result<(), OcrError> {
        Ok(())
    }

    fn recognize(&self, image_png: &[u8]) -> Result<Vec<OcrToken>, OcrError>;
}

/// Lay plain text out as a token stream: one bbox row per line, boxes
/// advancing with character position. Used by the mock backend and by
/// backends that only report whole-text output.
pub fn tokens_from_text(text: &str, confidence: f64) -> Vec<OcrToken> {
    const LINE_HEIGHT: u32 = 24;
    const CHAR_WIDTH: u32 = 12;

    let mut tokens = Vec::new();
    for (row, line) in text.lines().enumerate() {
        let mut column = 0u32;
        for word in line.split_whitespace() {
            let width = word.chars().count() as u32 * CHAR_WIDTH;
            tokens.push(OcrToken {
                text: word.to_string(),
                bbox: BoundingBox {
                    x: column,
                    y: row as u32 * LINE_HEIGHT,
                    width,
                    height: LINE_HEIGHT - 4,
                },
                confidence: confidence.clamp(0.0, 100.0),
            });
            column += width + CHAR_WIDTH;
        }
    }
    tokens
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a preset token stream regardless of the image — lets the
/// extraction and verification layers be tested without an engine
/// installed.
pub struct MockBackend {
    tokens: Vec<OcrToken>,
}

impl MockBackend {
    pub fn new(tokens: Vec<OcrToken>) -> Self {
        Self { tokens }
    }

    /// Build from plain text with one uniform confidence.
    pub fn from_text(text: &str, confidence: f64) -> Self {
        Self { tokens: tokens_from_text(text, confidence) }
    }
}

impl OcrBackend for MockBackend {
    fn recognize(&self, _image_png: &[u8]) -> Result<Vec<OcrToken>, OcrError> {
        Ok(self.tokens.clone())
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{tokens_from_text, OcrBackend, OcrError, OcrToken};
    use leptess::LepTess;

    /// Engine-backed recognizer. Token geometry is coarse (synthesized
    /// from line/word position) because the plain-text API does not
    /// report word boxes; per-token confidence is the engine's mean.
    pub struct TesseractBackend {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractBackend {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractBackend {
        fn ensure_available(&self) -> Result<(), OcrError> {
            LepTess::new(self.data_path.as_deref(), &self.lang)
                .map(|_| ())
                .map_err(|e| OcrError::EngineUnavailable(e.to_string()))
        }

        fn recognize(&self, image_png: &[u8]) -> Result<Vec<OcrToken>, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::EngineUnavailable(e.to_string()))?;
            lt.set_image_from_mem(image_png)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let text = lt
                .get_utf8_text()
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            let confidence = lt.mean_text_conf() as f64;
            Ok(tokens_from_text(&text, confidence.clamp(0.0, 100.0)))
        }
    }
}
