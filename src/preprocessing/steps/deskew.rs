use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Rgb};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions};

/// Number of strongest line candidates considered for the skew estimate.
const MAX_SKEW_LINES: usize = 10;

/// Canny hysteresis thresholds tuned for printed receipts.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Straighten a skewed scan. Detects line segments via a Hough transform
/// over the edge map, takes the median angle of the strongest candidates,
/// and rotates the image about its center when the skew exceeds
/// `min_angle` degrees. Already-straight images pass through untouched,
/// making the step idempotent.
pub fn apply(image: DynamicImage, min_angle: f32) -> Result<DynamicImage, PipelineError> {
    let gray = image.to_luma8();
    let angle = detect_skew_angle(&gray);

    if angle.abs() <= min_angle {
        return Ok(image);
    }

    // Rotate opposite the detected skew to bring text lines horizontal.
    let rgb = image.to_rgb8();
    let background = Rgb([255u8, 255, 255]);
    let rotated = rotate_about_center(
        &rgb,
        -angle.to_radians(),
        Interpolation::Bilinear,
        background,
    );

    Ok(DynamicImage::ImageRgb8(rotated))
}

/// Estimate the skew angle in degrees. Each detected line's angle is
/// normalized into (-45, 45]; the median across candidates is returned.
/// Returns 0.0 when no lines are found.
pub fn detect_skew_angle(gray: &GrayImage) -> f32 {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);

    let vote_threshold = (gray.width().min(gray.height()) / 4).max(30);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        },
    );

    if lines.is_empty() {
        return 0.0;
    }

    let mut angles: Vec<f32> = lines
        .iter()
        .take(MAX_SKEW_LINES)
        .map(|line| normalize_angle(line.angle_in_degrees as f32 - 90.0))
        .collect();

    angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    angles[angles.len() / 2]
}

/// Fold an angle into (-45, 45] so near-vertical rules and near-horizontal
/// text baselines vote for the same skew estimate.
fn normalize_angle(mut angle: f32) -> f32 {
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn straight_text_image() -> GrayImage {
        // Horizontal dark bars on white, like printed receipt lines.
        let mut img = GrayImage::from_pixel(200, 120, Luma([255]));
        for row in [30u32, 60, 90] {
            for x in 20..180 {
                img.put_pixel(x, row, Luma([0]));
                img.put_pixel(x, row + 1, Luma([0]));
            }
        }
        img
    }

    #[test]
    fn straight_image_detects_negligible_angle() {
        let angle = detect_skew_angle(&straight_text_image());
        assert!(angle.abs() <= 0.5, "expected near-zero skew, got {angle}");
    }

    #[test]
    fn deskew_is_idempotent_on_straight_image() {
        let img = DynamicImage::ImageLuma8(straight_text_image());
        let first = apply(img, 0.5).unwrap();
        let angle_after_first = detect_skew_angle(&first.to_luma8());
        let second = apply(first.clone(), 0.5).unwrap();
        let angle_after_second = detect_skew_angle(&second.to_luma8());

        // Neither pass found anything to rotate.
        assert!(angle_after_first.abs() <= 0.5);
        assert!(angle_after_second.abs() <= 0.5);
        assert_eq!(first.width(), second.width());
        assert_eq!(first.height(), second.height());
    }

    #[test]
    fn normalize_folds_into_quarter_turn() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(90.0), 0.0);
        assert_eq!(normalize_angle(-90.0), 0.0);
        assert_eq!(normalize_angle(46.0), -44.0);
        assert_eq!(normalize_angle(-46.0), 44.0);
    }

    #[test]
    fn blank_image_reports_zero() {
        let img = GrayImage::from_pixel(100, 100, Luma([255]));
        assert_eq!(detect_skew_angle(&img), 0.0);
    }
}
