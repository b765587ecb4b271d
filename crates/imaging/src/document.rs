use image::{DynamicImage, GenericImageView};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image too small to assess: {width}x{height} (minimum {min}x{min})")]
    Degenerate { width: u32, height: u32, min: u32 },
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// An immutable decoded document image with a stable identifier. The core
/// only ever reads the pixels; every transform produces a new image.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    id: String,
    image: DynamicImage,
    /// Dimensions declared by the submitter, if any. Observed dimensions
    /// always come from the decoded buffer.
    declared_dimensions: Option<(u32, u32)>,
}

impl DocumentImage {
    /// Decode raw file bytes. When no identifier is supplied the image is
    /// content-addressed by a truncated SHA-256 of the bytes, so the same
    /// upload always maps to the same document id.
    pub fn from_bytes(id: Option<String>, data: &[u8]) -> Result<Self, ImagingError> {
        let image = image::load_from_memory(data)?;
        let id = id.unwrap_or_else(|| content_id(data));
        Ok(Self { id, image, declared_dimensions: None })
    }

    /// Wrap an already-decoded image (tests, synthetic inputs).
    pub fn from_image(id: impl Into<String>, image: DynamicImage) -> Self {
        Self { id: id.into(), image, declared_dimensions: None }
    }

    pub fn with_declared_dimensions(mut self, width: u32, height: u32) -> Self {
        self.declared_dimensions = Some((width, height));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Observed pixel dimensions of the decoded buffer.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn declared_dimensions(&self) -> Option<(u32, u32)> {
        self.declared_dimensions
    }
}

/// Truncated SHA-256 hex digest of the raw bytes (16 chars is plenty to key
/// a batch).
pub fn content_id(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Encode an image as PNG bytes for handoff to the OCR engine.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImagingError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};

    fn png_bytes(value: u8) -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(8, 8, |_, _| Luma([value]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn content_id_is_stable() {
        let data = png_bytes(100);
        assert_eq!(content_id(&data), content_id(&data));
        assert_ne!(content_id(&data), content_id(&png_bytes(101)));
        assert_eq!(content_id(&data).len(), 16);
    }

    #[test]
    fn from_bytes_decodes_and_ids() {
        let data = png_bytes(100);
        let doc = DocumentImage::from_bytes(None, &data).unwrap();
        assert_eq!(doc.dimensions(), (8, 8));
        assert_eq!(doc.id(), content_id(&data));
    }

    #[test]
    fn caller_supplied_id_wins() {
        let doc = DocumentImage::from_bytes(Some("doc-a".into()), &png_bytes(50)).unwrap();
        assert_eq!(doc.id(), "doc-a");
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = DocumentImage::from_bytes(None, b"not an image").unwrap_err();
        assert!(matches!(err, ImagingError::Decode(_)));
    }

    #[test]
    fn encode_png_roundtrips() {
        let doc = DocumentImage::from_bytes(None, &png_bytes(77)).unwrap();
        let out = encode_png(doc.image()).unwrap();
        assert_eq!(&out[..4], b"\x89PNG");
    }
}
