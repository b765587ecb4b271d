use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{
    rotate_about_center, warp, Interpolation, Projection,
};

use veridoc_core::{EnhancementOp, MetricName, QualityReport, QualityThresholds, Severity};

use crate::document::ImagingError;
use crate::quality;

/// Fraction of the detected page mask that must fall inside the candidate
/// quad before a perspective warp is trusted. Below this the step fails
/// open and leaves the image untouched.
const PERSPECTIVE_MIN_CONFIDENCE: f64 = 0.70;
/// Corner angles within this many degrees of 90 count as already
/// rectangular.
const PERSPECTIVE_ANGLE_TOLERANCE: f64 = 2.0;
/// Minimum share of page pixels for a boundary to be considered detected.
const PERSPECTIVE_MIN_MASK_FRACTION: f64 = 0.05;

const CLAHE_GRID: u32 = 8;
const CLAHE_CLIP_FACTOR: f64 = 4.0;
const BRIGHTNESS_TARGET: f64 = 128.0;

/// The enhanced image, the transforms that were applied in order, and the
/// quality report recomputed on the result.
#[derive(Debug, Clone)]
pub struct EnhancementResult {
    pub image: DynamicImage,
    pub operations_applied: Vec<EnhancementOp>,
    pub report: QualityReport,
}

/// Apply defect-targeted corrections in a fixed order: rotation,
/// perspective, contrast, denoise, brightness. Only metrics below GREEN
/// trigger their operation, except the always-on light denoise pass, so a
/// fully compliant image passes through nearly unchanged.
pub fn enhance(
    image: &DynamicImage,
    report: &QualityReport,
    config: &QualityThresholds,
) -> Result<EnhancementResult, ImagingError> {
    let mut gray = image.to_luma8();
    let mut operations_applied = Vec::new();

    if report.severity_of(MetricName::Rotation) != Severity::Green {
        if let Some(metric) = report.metric(MetricName::Rotation) {
            gray = rotate_about_center(
                &gray,
                (-metric.value).to_radians() as f32,
                Interpolation::Bilinear,
                Luma([255u8]),
            );
            operations_applied.push(EnhancementOp::RotationCorrect);
        }
    }

    if let Some(projection) = detect_keystone(&gray) {
        gray = warp(&gray, &projection, Interpolation::Bilinear, Luma([255u8]));
        operations_applied.push(EnhancementOp::PerspectiveCorrect);
    }

    if report.severity_of(MetricName::Contrast) != Severity::Green {
        gray = clahe(&gray, CLAHE_GRID, CLAHE_CLIP_FACTOR);
        operations_applied.push(EnhancementOp::ContrastEnhance);
    }

    // Light edge-preserving smoothing, always applied.
    gray = median_filter(&gray, 1, 1);
    operations_applied.push(EnhancementOp::Denoise);

    if report.severity_of(MetricName::Brightness) != Severity::Green {
        gray = normalize_brightness(&gray);
        operations_applied.push(EnhancementOp::BrightnessNormalize);
    }

    let image = DynamicImage::ImageLuma8(gray);
    let report = quality::assess_image(&image, config)?;
    Ok(EnhancementResult { image, operations_applied, report })
}

// ── Perspective ───────────────────────────────────────────────────────────────

/// Detect a keystoned page boundary and build the projection that squares
/// it. Returns `None` whenever the boundary is missing, rectangular within
/// tolerance, or not confident enough to warp: guessing a wrong boundary is
/// worse than skipping the correction.
fn detect_keystone(gray: &GrayImage) -> Option<Projection> {
    let (width, height) = gray.dimensions();
    let threshold = otsu_level(gray);

    // The page is the bright region; everything at or above the Otsu split
    // counts as page mask. Corner candidates are the mask extremes of
    // x + y (top-left / bottom-right) and x - y (top-right / bottom-left).
    let mut mask_count = 0u64;
    let mut min_sum = i64::MAX;
    let mut max_sum = i64::MIN;
    let mut max_diff = i64::MIN;
    let mut min_diff = i64::MAX;
    let mut tl_pt = (0f64, 0f64);
    let mut br_pt = (0f64, 0f64);
    let mut tr_pt = (0f64, 0f64);
    let mut bl_pt = (0f64, 0f64);

    for (x, y, p) in gray.enumerate_pixels() {
        if p.0[0] < threshold {
            continue;
        }
        mask_count += 1;
        let sum = x as i64 + y as i64;
        let diff = x as i64 - y as i64;
        if sum < min_sum {
            min_sum = sum;
            tl_pt = (x as f64, y as f64);
        }
        if sum > max_sum {
            max_sum = sum;
            br_pt = (x as f64, y as f64);
        }
        if diff > max_diff {
            max_diff = diff;
            tr_pt = (x as f64, y as f64);
        }
        if diff < min_diff {
            min_diff = diff;
            bl_pt = (x as f64, y as f64);
        }
    }

    let total = width as u64 * height as u64;
    if (mask_count as f64) < PERSPECTIVE_MIN_MASK_FRACTION * total as f64 {
        return None;
    }

    let corners = [tl_pt, tr_pt, br_pt, bl_pt];
    if is_rectangular(&corners, PERSPECTIVE_ANGLE_TOLERANCE) {
        return None;
    }

    // Boundary confidence: the share of mask pixels the quad actually
    // encloses. A scattered mask yields corners that describe nothing.
    let inside = gray
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] >= threshold)
        .filter(|(x, y, _)| point_in_quad((*x as f64, *y as f64), &corners))
        .count() as f64;
    if inside / (mask_count as f64) < PERSPECTIVE_MIN_CONFIDENCE {
        return None;
    }

    // Square the quad onto its axis-aligned bounding box.
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

    let from = [
        (tl_pt.0 as f32, tl_pt.1 as f32),
        (tr_pt.0 as f32, tr_pt.1 as f32),
        (br_pt.0 as f32, br_pt.1 as f32),
        (bl_pt.0 as f32, bl_pt.1 as f32),
    ];
    let to = [
        (min_x as f32, min_y as f32),
        (max_x as f32, min_y as f32),
        (max_x as f32, max_y as f32),
        (min_x as f32, max_y as f32),
    ];
    Projection::from_control_points(from, to)
}

fn is_rectangular(corners: &[(f64, f64); 4], tolerance_degrees: f64) -> bool {
    (0..4).all(|i| {
        let prev = corners[(i + 3) % 4];
        let here = corners[i];
        let next = corners[(i + 1) % 4];
        let a = (prev.0 - here.0, prev.1 - here.1);
        let b = (next.0 - here.0, next.1 - here.1);
        let dot = a.0 * b.0 + a.1 * b.1;
        let mag = (a.0 * a.0 + a.1 * a.1).sqrt() * (b.0 * b.0 + b.1 * b.1).sqrt();
        if mag == 0.0 {
            return false;
        }
        let angle = (dot / mag).clamp(-1.0, 1.0).acos().to_degrees();
        (angle - 90.0).abs() <= tolerance_degrees
    })
}

fn point_in_quad(p: (f64, f64), corners: &[(f64, f64); 4]) -> bool {
    // Consistent cross-product sign against each directed edge.
    let mut sign = 0.0f64;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
    }
    true
}

// ── Contrast ──────────────────────────────────────────────────────────────────

/// Clip-limited adaptive histogram equalization on the luminance channel.
/// Each grid tile gets its own clipped equalization LUT; per-pixel output
/// bilinearly blends the four surrounding tile LUTs so tile seams never
/// show.
fn clahe(gray: &GrayImage, grid: u32, clip_factor: f64) -> GrayImage {
    let (width, height) = gray.dimensions();
    let grid_x = grid.clamp(1, width);
    let grid_y = grid.clamp(1, height);
    let tile_w = width.div_ceil(grid_x);
    let tile_h = height.div_ceil(grid_y);

    let mut luts = vec![[0u8; 256]; (grid_x * grid_y) as usize];
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut histogram = [0u64; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let total = ((x1 - x0) * (y1 - y0)) as u64;

            // Clip and redistribute the excess uniformly.
            let clip = ((clip_factor * total as f64 / 256.0).max(1.0)) as u64;
            let mut excess = 0u64;
            for bin in histogram.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256;
            for bin in histogram.iter_mut() {
                *bin += bonus;
            }

            let lut = &mut luts[(ty * grid_x + tx) as usize];
            let mut cumulative = 0u64;
            for value in 0..256 {
                cumulative += histogram[value];
                lut[value] = ((cumulative * 255) / total.max(1)).min(255) as u8;
            }
        }
    }

    let lut_at = |tx: i64, ty: i64| -> &[u8; 256] {
        let tx = tx.clamp(0, grid_x as i64 - 1) as u32;
        let ty = ty.clamp(0, grid_y as i64 - 1) as u32;
        &luts[(ty * grid_x + tx) as usize]
    };

    ImageBuffer::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y).0[0] as usize;
        let fx = x as f64 / tile_w as f64 - 0.5;
        let fy = y as f64 / tile_h as f64 - 0.5;
        let tx0 = fx.floor() as i64;
        let ty0 = fy.floor() as i64;
        let wx = fx - fx.floor();
        let wy = fy - fy.floor();

        let v00 = lut_at(tx0, ty0)[value] as f64;
        let v01 = lut_at(tx0 + 1, ty0)[value] as f64;
        let v10 = lut_at(tx0, ty0 + 1)[value] as f64;
        let v11 = lut_at(tx0 + 1, ty0 + 1)[value] as f64;
        let top = v00 * (1.0 - wx) + v01 * wx;
        let bottom = v10 * (1.0 - wx) + v11 * wx;
        Luma([(top * (1.0 - wy) + bottom * wy).round() as u8])
    })
}

// ── Brightness ────────────────────────────────────────────────────────────────

/// Linear rescale of the mean luminance toward the optimal midpoint.
fn normalize_brightness(gray: &GrayImage) -> GrayImage {
    let n = (gray.width() as u64 * gray.height() as u64) as f64;
    let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    if mean <= 0.0 {
        return gray.clone();
    }
    let factor = BRIGHTNESS_TARGET / mean;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0] as f64 * factor;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::assess_image;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

    fn config() -> QualityThresholds {
        QualityThresholds::default()
    }

    fn gray_image(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)]));
        DynamicImage::ImageLuma8(img)
    }

    fn clean_document() -> DynamicImage {
        gray_image(1700, 400, |_, y| if y % 16 < 4 { 10 } else { 220 })
    }

    #[test]
    fn compliant_image_is_left_alone() {
        let img = clean_document();
        let before = assess_image(&img, &config()).unwrap();
        assert!(before.all_green());

        let result = enhance(&img, &before, &config()).unwrap();
        // Only the always-on denoise pass runs.
        assert_eq!(result.operations_applied, vec![EnhancementOp::Denoise]);
        // Idempotence: the aggregate may not move more than the tolerance.
        assert!(
            (result.report.score - before.score).abs() <= 2.0,
            "score moved from {} to {}",
            before.score,
            result.report.score
        );
    }

    #[test]
    fn enhancement_preserves_dimensions() {
        let img = clean_document();
        let report = assess_image(&img, &config()).unwrap();
        let result = enhance(&img, &report, &config()).unwrap();
        assert_eq!(result.image.width(), img.width());
        assert_eq!(result.image.height(), img.height());
    }

    #[test]
    fn skewed_image_gets_rotation_corrected() {
        // ~2.9 degree smooth stripe tilt.
        let img = gray_image(1700, 400, |x, y| {
            let t = y as f64 + 0.05 * x as f64;
            (128.0 + 100.0 * (t * std::f64::consts::PI / 8.0).sin()).round() as u8
        });
        let before = assess_image(&img, &config()).unwrap();
        assert_ne!(
            before.severity_of(MetricName::Rotation),
            Severity::Green,
            "test image must start skewed"
        );

        let result = enhance(&img, &before, &config()).unwrap();
        assert!(result.operations_applied.contains(&EnhancementOp::RotationCorrect));

        let after = result.report.metric(MetricName::Rotation).unwrap();
        let original = before.metric(MetricName::Rotation).unwrap();
        assert!(
            after.value.abs() < original.value.abs(),
            "skew went from {} to {}",
            original.value,
            after.value
        );
        assert!(after.value.abs() < 1.0, "residual skew {}", after.value);
    }

    #[test]
    fn dark_image_gets_brightness_normalized() {
        let img = gray_image(600, 400, |x, y| if (x + y) % 2 == 0 { 5 } else { 35 });
        let before = assess_image(&img, &config()).unwrap();
        assert_eq!(before.severity_of(MetricName::Brightness), Severity::Red);

        let result = enhance(&img, &before, &config()).unwrap();
        assert!(result
            .operations_applied
            .contains(&EnhancementOp::BrightnessNormalize));
        let after = result.report.metric(MetricName::Brightness).unwrap();
        assert_eq!(after.severity, Severity::Green, "mean after was {}", after.value);
    }

    #[test]
    fn low_contrast_triggers_clahe() {
        // Murky mid-gray stripes: visible structure, poor spread.
        let img = gray_image(1700, 400, |_, y| if y % 16 < 4 { 110 } else { 150 });
        let before = assess_image(&img, &config()).unwrap();
        assert_ne!(before.severity_of(MetricName::Contrast), Severity::Green);

        let result = enhance(&img, &before, &config()).unwrap();
        assert!(result.operations_applied.contains(&EnhancementOp::ContrastEnhance));
        let after = result.report.metric(MetricName::Contrast).unwrap();
        let original = before.metric(MetricName::Contrast).unwrap();
        assert!(
            after.value > original.value,
            "contrast went from {} to {}",
            original.value,
            after.value
        );
    }

    #[test]
    fn full_frame_scan_skips_perspective() {
        // The page fills the frame: the detected boundary is rectangular,
        // so no warp may be applied.
        let img = clean_document();
        let report = assess_image(&img, &config()).unwrap();
        let result = enhance(&img, &report, &config()).unwrap();
        assert!(!result
            .operations_applied
            .contains(&EnhancementOp::PerspectiveCorrect));
    }

    #[test]
    fn keystoned_page_triggers_perspective() {
        // A bright quadrilateral page on a dark backdrop, visibly
        // keystoned (top edge narrower than the bottom).
        let corners = [(300.0, 60.0), (1400.0, 60.0), (1600.0, 360.0), (100.0, 360.0)];
        let img = gray_image(1700, 400, |x, y| {
            if point_in_quad((x as f64, y as f64), &corners) {
                210
            } else {
                15
            }
        });
        let report = assess_image(&img, &config()).unwrap();
        let result = enhance(&img, &report, &config()).unwrap();
        assert!(result
            .operations_applied
            .contains(&EnhancementOp::PerspectiveCorrect));
    }

    #[test]
    fn operations_follow_fixed_order() {
        // A skewed, murky, dark image exercises several corrections; their
        // report order must match the pipeline order.
        let img = gray_image(1700, 400, |x, y| {
            let t = y as f64 + 0.06 * x as f64;
            (40.0 + 20.0 * (t * std::f64::consts::PI / 8.0).sin()).round() as u8
        });
        let report = assess_image(&img, &config()).unwrap();
        let result = enhance(&img, &report, &config()).unwrap();

        let order = [
            EnhancementOp::RotationCorrect,
            EnhancementOp::PerspectiveCorrect,
            EnhancementOp::ContrastEnhance,
            EnhancementOp::Denoise,
            EnhancementOp::BrightnessNormalize,
        ];
        let positions: Vec<usize> = result
            .operations_applied
            .iter()
            .map(|op| order.iter().position(|o| o == op).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        assert!(result.operations_applied.contains(&EnhancementOp::Denoise));
    }
}
