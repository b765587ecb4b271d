use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use veridoc_core::{
    DocumentRecord, EnhancementSummary, ExtractedFields, MismatchRecord, RiskAssessment,
    VerifyConfig,
};
use veridoc_imaging::document::encode_png;
use veridoc_imaging::{assess, enhance, DocumentImage, ImagingError};
use veridoc_ocr::{FieldExtractor, OcrBackend, OcrError};

use crate::mismatch::{MismatchDetector, MismatchInputError};
use crate::risk::RiskAssessor;

/// File extensions accepted for document images.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file extension: .{0}")]
    UnsupportedExtension(String),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Mismatch(#[from] MismatchInputError),
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// The two-document comparison result handed to reporting and audit
/// consumers. Produced once per verification session and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub session_id: String,
    pub document_a: DocumentRecord,
    pub document_b: DocumentRecord,
    pub mismatches: Vec<MismatchRecord>,
    pub risk: RiskAssessment,
}

/// Per-document outcomes of a batch run. A failing document lands in
/// `errors` under its identifier without aborting the rest.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub records: BTreeMap<String, DocumentRecord>,
    pub errors: BTreeMap<String, String>,
}

/// Orchestrates assess → enhance → OCR → extract per document and the
/// mismatch/risk comparison across a pair. Holds no per-document state:
/// the backend and threshold configuration are acquired once and shared
/// read-only.
pub struct VerificationPipeline<B: OcrBackend> {
    backend: Arc<B>,
    config: Arc<VerifyConfig>,
}

impl<B: OcrBackend> Clone for VerificationPipeline<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend), config: Arc::clone(&self.config) }
    }
}

impl<B: OcrBackend> std::fmt::Debug for VerificationPipeline<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline").finish_non_exhaustive()
    }
}

impl<B: OcrBackend + 'static> VerificationPipeline<B> {
    /// Probes the OCR engine up front: a missing engine is a configuration
    /// error for the whole run, reported before any document is touched.
    pub fn new(backend: B, config: VerifyConfig) -> Result<Self, PipelineError> {
        backend.ensure_available()?;
        Ok(Self { backend: Arc::new(backend), config: Arc::new(config) })
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Process a document image from disk.
    pub async fn process_file(&self, path: &Path) -> Result<DocumentRecord, PipelineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(PipelineError::UnsupportedExtension(ext));
        }

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
        let bytes = tokio::fs::read(path).await?;
        self.process_bytes(id, &bytes).await
    }

    /// Process raw image bytes: decode, score, enhance, OCR, extract.
    pub async fn process_bytes(
        &self,
        id: Option<String>,
        data: &[u8],
    ) -> Result<DocumentRecord, PipelineError> {
        // Stages 1-2 are pure CPU work; keep them off the async runtime.
        let config = Arc::clone(&self.config);
        let owned = data.to_vec();
        let (document_id, quality, enhancement, png) =
            tokio::task::spawn_blocking(move || -> Result<_, PipelineError> {
                let doc = DocumentImage::from_bytes(id, &owned)?;
                let quality = assess(&doc, &config.quality)?;
                debug!(
                    document = doc.id(),
                    score = quality.score,
                    "quality assessed"
                );
                let enhanced = enhance(doc.image(), &quality, &config.quality)?;
                let png = encode_png(&enhanced.image)?;
                let summary = EnhancementSummary {
                    operations_applied: enhanced.operations_applied,
                    enhanced_quality: enhanced.report,
                };
                Ok((doc.id().to_string(), quality, summary, png))
            })
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;

        // Stage 3: the external engine, under the configured timeout. A
        // timed-out document reports a zero-confidence extraction instead
        // of stalling the batch.
        let extracted = match self.recognize_with_timeout(png).await? {
            Some(tokens) => FieldExtractor::extract(&tokens),
            None => {
                warn!(document = %document_id, "OCR timed out; reporting zero-confidence extraction");
                ExtractedFields::empty()
            }
        };

        info!(
            document = %document_id,
            fields = extracted.fields.len(),
            ocr_confidence = extracted.ocr_confidence,
            "document processed"
        );

        Ok(DocumentRecord {
            document_id,
            quality,
            enhancement,
            ocr_confidence: extracted.ocr_confidence,
            fields: extracted.fields,
        })
    }

    async fn recognize_with_timeout(
        &self,
        png: Vec<u8>,
    ) -> Result<Option<Vec<veridoc_ocr::OcrToken>>, PipelineError> {
        let backend = Arc::clone(&self.backend);
        let budget = Duration::from_millis(self.config.ocr.timeout_ms);
        let call = tokio::task::spawn_blocking(move || backend.recognize(&png));
        match tokio::time::timeout(budget, call).await {
            Err(_elapsed) => Ok(None),
            Ok(joined) => {
                let tokens = joined.map_err(|e| PipelineError::Worker(e.to_string()))??;
                Ok(Some(tokens))
            }
        }
    }

    /// Verify a pair of documents. The two per-document pipelines have no
    /// data dependency and run concurrently; the comparison is the
    /// synchronization barrier.
    pub async fn verify_pair(
        &self,
        path_a: &Path,
        path_b: &Path,
    ) -> Result<VerificationOutcome, PipelineError> {
        let (a, b) = tokio::join!(self.process_file(path_a), self.process_file(path_b));
        self.compare_records(a?, b?)
    }

    /// Compare two already-processed document records.
    pub fn compare_records(
        &self,
        a: DocumentRecord,
        b: DocumentRecord,
    ) -> Result<VerificationOutcome, PipelineError> {
        let fields_a =
            ExtractedFields { fields: a.fields.clone(), ocr_confidence: a.ocr_confidence };
        let fields_b =
            ExtractedFields { fields: b.fields.clone(), ocr_confidence: b.ocr_confidence };

        let mismatches =
            MismatchDetector::compare(&fields_a, &fields_b, &self.config.similarity)?;
        let risk = RiskAssessor::assess(
            &mismatches,
            fields_a.ocr_confidence,
            fields_b.ocr_confidence,
            &self.config.risk,
        );
        info!(
            document_a = %a.document_id,
            document_b = %b.document_id,
            decision = %risk.decision,
            tier = %risk.tier,
            "pair verified"
        );

        Ok(VerificationOutcome {
            session_id: Uuid::new_v4().to_string(),
            document_a: a,
            document_b: b,
            mismatches,
            risk,
        })
    }

    /// Process every path independently; per-document failures are
    /// collected, keyed by document identifier, alongside the successes.
    pub async fn process_batch(&self, paths: Vec<PathBuf>) -> BatchOutcome {
        let mut set = JoinSet::new();
        for path in paths {
            let pipeline = self.clone();
            set.spawn(async move {
                let key = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| path.display().to_string());
                (key, pipeline.process_file(&path).await)
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(record))) => {
                    outcome.records.insert(record.document_id.clone(), record);
                }
                Ok((key, Err(e))) => {
                    warn!(document = %key, error = %e, "document failed");
                    outcome.errors.insert(key, e.to_string());
                }
                Err(e) => {
                    let key = format!("internal-{}", outcome.errors.len());
                    outcome.errors.insert(key, e.to_string());
                }
            }
        }
        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
