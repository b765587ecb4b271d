use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use veridoc_core::VerifyConfig;
use veridoc_ocr::OcrBackend;
use veridoc_verify::{VerificationPipeline, SUPPORTED_EXTENSIONS};

/// Command-line driver for the document verification pipeline.
#[derive(Parser, Debug)]
#[command(name = "veridoc")]
#[command(about = "Identity document quality, extraction and verification")]
#[command(version)]
struct Cli {
    /// Threshold configuration overrides (TOML).
    #[arg(short, long, env = "VERIDOC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score, enhance and extract a single document; print its record.
    Inspect { image: PathBuf },
    /// Compare two documents; print the mismatch and risk outcome.
    Verify { image_a: PathBuf, image_b: PathBuf },
    /// Process every supported image in a directory; print per-document
    /// records and errors.
    Batch { dir: PathBuf },
}

#[cfg(feature = "tesseract")]
fn backend() -> impl OcrBackend + 'static {
    veridoc_ocr::recognizer::tesseract_backend::TesseractBackend::new(
        std::env::var("VERIDOC_TESSDATA").ok(),
        "eng",
    )
}

// Without the tesseract feature the engine is a stand-in that recognizes
// nothing; quality and enhancement still run end to end.
#[cfg(not(feature = "tesseract"))]
fn backend() -> impl OcrBackend + 'static {
    tracing::warn!("built without the `tesseract` feature; using the no-op OCR backend");
    veridoc_ocr::MockBackend::new(vec![])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => VerifyConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => VerifyConfig::default(),
    };

    let pipeline = VerificationPipeline::new(backend(), config)
        .context("OCR engine unavailable; check the engine installation")?;

    match cli.command {
        Command::Inspect { image } => {
            let record = pipeline
                .process_file(&image)
                .await
                .with_context(|| format!("processing {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Verify { image_a, image_b } => {
            let outcome = pipeline.verify_pair(&image_a, &image_b).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Batch { dir } => {
            let paths = collect_images(&dir)
                .with_context(|| format!("reading {}", dir.display()))?;
            anyhow::ensure!(!paths.is_empty(), "no supported images in {}", dir.display());
            let outcome = pipeline.process_batch(paths).await;
            tracing::info!(
                processed = outcome.records.len(),
                failed = outcome.errors.len(),
                "batch complete"
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

/// Supported image files in a directory, sorted for a stable processing
/// order.
fn collect_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}
