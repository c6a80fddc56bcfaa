use crate::error::PipelineError;
use image::{DynamicImage, Rgb, RgbImage};

/// Spatial window radius in pixels.
const RADIUS: u32 = 2;
/// Range sigma; smaller values preserve edges more aggressively.
const RANGE_SIGMA: f32 = 30.0;

/// Edge-preserving smoothing. Each pixel is replaced by a range-weighted
/// average of its neighborhood: neighbors with similar color contribute
/// fully, neighbors across an edge contribute almost nothing. Suppresses
/// sensor and compression noise without blurring character strokes.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PipelineError> {
    let rgb = image.to_rgb8();
    Ok(DynamicImage::ImageRgb8(bilateral(&rgb, RADIUS, RANGE_SIGMA)))
}

fn bilateral(img: &RgbImage, radius: u32, range_sigma: f32) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let mut output = RgbImage::new(w, h);
    let range_div = 2.0 * range_sigma * range_sigma;

    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x, y).0;
            let mut sums = [0.0f32; 3];
            let mut weight_sum = 0.0f32;

            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius + 1).min(h);
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);

            for ny in y0..y1 {
                for nx in x0..x1 {
                    let p = img.get_pixel(nx, ny).0;
                    let dist_sq: f32 = (0..3)
                        .map(|c| {
                            let d = p[c] as f32 - center[c] as f32;
                            d * d
                        })
                        .sum();
                    let weight = (-dist_sq / range_div).exp();
                    for c in 0..3 {
                        sums[c] += p[c] as f32 * weight;
                    }
                    weight_sum += weight;
                }
            }

            let mut out = [0u8; 3];
            for c in 0..3 {
                out[c] = (sums[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
            output.put_pixel(x, y, Rgb(out));
        }
    }

    output
}
