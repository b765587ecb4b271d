use image::{DynamicImage, GrayImage};
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use veridoc_core::{MetricName, QualityMetric, QualityReport, QualityThresholds};

use crate::document::{DocumentImage, ImagingError};

// Calibration constants for score normalization. The severity cut lines
// live in `QualityThresholds`; these only map raw measurements onto the
// 0-100 scale.
const LAPLACIAN_FULL_VARIANCE: f64 = 500.0;
const GRADIENT_FULL_MEAN: f64 = 40.0;
const RESIDUAL_FULL_RATIO: f64 = 0.3;
const RESIDUAL_SIGMA: f32 = 2.0;

// Skew voting: only gradients at least this strong count, and the angle
// search stays within this window of vertical.
const EDGE_MAGNITUDE_MIN: f64 = 64.0;
const SKEW_WINDOW_DEGREES: f64 = 15.0;
const MIN_EDGE_VOTES: usize = 64;

/// Score a document image across the five quality dimensions.
///
/// Never fails on a well-formed image; returns `ImagingError::Degenerate`
/// when either side is below the configured minimum so later metrics cannot
/// divide by zero.
pub fn assess(doc: &DocumentImage, config: &QualityThresholds) -> Result<QualityReport, ImagingError> {
    assess_image(doc.image(), config)
}

pub fn assess_image(
    image: &DynamicImage,
    config: &QualityThresholds,
) -> Result<QualityReport, ImagingError> {
    let width = image.width();
    let height = image.height();
    if width < config.min_dimension || height < config.min_dimension {
        return Err(ImagingError::Degenerate { width, height, min: config.min_dimension });
    }

    let gray = image.to_luma8();
    let histogram = luma_histogram(&gray);
    let pixel_count = (width as u64 * height as u64) as f64;

    // DPI is estimated from the observed pixel width against an assumed A4
    // page width. There is no EXIF cross-check: the estimate is a
    // resolution proxy, not ground truth.
    let dpi = width as f64 / config.page_width_inches;
    let dpi_score = dpi / config.dpi_score_ceiling * 100.0;

    let contrast = percentile_spread(&histogram, pixel_count);

    let skew = estimate_skew(&gray);
    let rotation_score = 100.0 * (1.0 - (skew.abs() / config.rotation_score_floor).min(1.0));

    let (blur_score, degraded) = combined_blur_score(&gray, &histogram, pixel_count);

    let brightness = mean_luma(&histogram, pixel_count);
    let brightness_score = 100.0 * (1.0 - (brightness - 128.0).abs() / 127.5);

    let metrics = vec![
        QualityMetric::new(MetricName::Dpi, dpi, dpi_score, config.dpi.classify(dpi)),
        QualityMetric::new(
            MetricName::Contrast,
            contrast,
            contrast,
            config.contrast.classify(contrast),
        ),
        QualityMetric::new(
            MetricName::Rotation,
            skew,
            rotation_score,
            config.rotation.classify(skew.abs()),
        ),
        QualityMetric::new(
            MetricName::Blur,
            blur_score,
            blur_score,
            config.blur.classify(blur_score),
        ),
        QualityMetric::new(
            MetricName::Brightness,
            brightness,
            brightness_score,
            config.brightness.classify(brightness),
        ),
    ];

    Ok(QualityReport::from_metrics(metrics, config.red_slack, degraded))
}

// ── Histogram helpers ─────────────────────────────────────────────────────────

fn luma_histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    histogram
}

fn mean_luma(histogram: &[u64; 256], pixel_count: f64) -> f64 {
    let sum: u64 = histogram.iter().enumerate().map(|(v, &n)| v as u64 * n).sum();
    sum as f64 / pixel_count
}

fn luma_stddev(histogram: &[u64; 256], pixel_count: f64) -> f64 {
    let mean = mean_luma(histogram, pixel_count);
    let var: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| (v as f64 - mean).powi(2) * n as f64)
        .sum::<f64>()
        / pixel_count;
    var.sqrt()
}

/// Percentile-range contrast: the 5th-95th percentile luminance spread as a
/// percentage of the full 8-bit range. Robust to a few specular or dead
/// pixels, unlike a min/max stretch.
fn percentile_spread(histogram: &[u64; 256], pixel_count: f64) -> f64 {
    let p5 = percentile(histogram, pixel_count, 0.05);
    let p95 = percentile(histogram, pixel_count, 0.95);
    (p95 - p5) as f64 / 255.0 * 100.0
}

fn percentile(histogram: &[u64; 256], pixel_count: f64, fraction: f64) -> u8 {
    let target = (pixel_count * fraction).ceil() as u64;
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as u8;
        }
    }
    255
}

// ── Rotation ──────────────────────────────────────────────────────────────────

/// Estimate the page skew in signed degrees from Sobel gradient
/// orientations. Horizontal text lines produce near-vertical gradients;
/// the magnitude-weighted mean deviation from vertical is the skew. Returns
/// 0 when too few strong edges vote to trust the estimate.
fn estimate_skew(gray: &GrayImage) -> f64 {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let mut weighted_sum = 0.0f64;
    let mut total_weight = 0.0f64;
    let mut votes = 0usize;

    for (px, py) in gx.pixels().zip(gy.pixels()) {
        let dx = px.0[0] as f64;
        let dy = py.0[0] as f64;
        let magnitude = (dx * dx + dy * dy).sqrt();
        if magnitude < EDGE_MAGNITUDE_MIN {
            continue;
        }

        let angle = dy.atan2(dx).to_degrees();
        // Fold the gradient direction onto its deviation from the nearest
        // vertical axis (+90 or -90).
        let deviation = if angle >= 0.0 { angle - 90.0 } else { angle + 90.0 };
        if deviation.abs() > SKEW_WINDOW_DEGREES {
            continue;
        }

        weighted_sum += deviation * magnitude;
        total_weight += magnitude;
        votes += 1;
    }

    if votes < MIN_EDGE_VOTES || total_weight == 0.0 {
        return 0.0;
    }
    weighted_sum / total_weight
}

// ── Blur ──────────────────────────────────────────────────────────────────────

/// Worst-case blur score: the minimum of three independent estimators, each
/// normalized to 0-100. A document is only as sharp as its weakest
/// measurement, so one method cannot mask blur another one sees. Returns
/// the combined score and whether the combination had to degrade to fewer
/// estimators.
fn combined_blur_score(
    gray: &GrayImage,
    histogram: &[u64; 256],
    pixel_count: f64,
) -> (f64, bool) {
    let estimates = [
        Some(laplacian_variance_score(gray)),
        Some(gradient_energy_score(gray)),
        high_frequency_score(gray, histogram, pixel_count),
    ];

    let available: Vec<f64> = estimates.iter().flatten().copied().collect();
    let degraded = available.len() < estimates.len();
    let score = available.into_iter().fold(f64::INFINITY, f64::min);
    if score.is_finite() {
        (score, degraded)
    } else {
        (0.0, true)
    }
}

/// Spatial-domain sharpness: variance of the Laplacian response.
fn laplacian_variance_score(gray: &GrayImage) -> f64 {
    let lap = laplacian_filter(gray);
    let n = lap.pixels().len() as f64;
    let mean: f64 = lap.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    let variance: f64 =
        lap.pixels().map(|p| (p.0[0] as f64 - mean).powi(2)).sum::<f64>() / n;
    (variance / LAPLACIAN_FULL_VARIANCE * 100.0).clamp(0.0, 100.0)
}

/// Gradient-magnitude energy: mean Sobel magnitude per pixel.
fn gradient_energy_score(gray: &GrayImage) -> f64 {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let n = gx.pixels().len() as f64;
    let mean: f64 = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(px, py)| {
            let dx = px.0[0] as f64;
            let dy = py.0[0] as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum::<f64>()
        / n;
    (mean / GRADIENT_FULL_MEAN * 100.0).clamp(0.0, 100.0)
}

/// Frequency-domain proxy: energy of the gaussian high-pass residual
/// relative to the overall luminance spread. A sharp scan keeps a large
/// share of its energy above the blur cutoff; a defocused one does not.
/// Unavailable on a (near-)uniform image, where the ratio is undefined.
fn high_frequency_score(
    gray: &GrayImage,
    histogram: &[u64; 256],
    pixel_count: f64,
) -> Option<f64> {
    let overall_std = luma_stddev(histogram, pixel_count);
    if overall_std < 1.0 {
        return None;
    }

    let blurred = gaussian_blur_f32(gray, RESIDUAL_SIGMA);
    let n = pixel_count;
    let mean_residual: f64 = gray
        .pixels()
        .zip(blurred.pixels())
        .map(|(a, b)| (a.0[0] as f64 - b.0[0] as f64))
        .sum::<f64>()
        / n;
    let residual_var: f64 = gray
        .pixels()
        .zip(blurred.pixels())
        .map(|(a, b)| {
            let r = a.0[0] as f64 - b.0[0] as f64;
            (r - mean_residual).powi(2)
        })
        .sum::<f64>()
        / n;

    let ratio = residual_var.sqrt() / overall_std;
    Some((ratio / RESIDUAL_FULL_RATIO * 100.0).clamp(0.0, 100.0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
