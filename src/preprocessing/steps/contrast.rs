use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

/// Tiles per axis for local equalization.
const GRID: u32 = 8;
/// Histogram clip factor relative to the uniform bin height.
const CLIP_FACTOR: f32 = 3.0;

/// Adaptive local-contrast normalization. Equalizes the luminance channel
/// per tile with a clipped histogram, interpolates between neighboring
/// tile mappings to avoid block seams, then recomposes color by scaling
/// each channel with the luminance ratio.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PipelineError> {
    let rgb = image.to_rgb8();
    let luma = luminance(&rgb);
    let equalized = clahe(&luma);

    let out = RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let old = luma.get_pixel(x, y).0[0] as f32;
        let new = equalized.get_pixel(x, y).0[0] as f32;
        let px = rgb.get_pixel(x, y).0;
        if old < 1.0 {
            Rgb([new as u8; 3])
        } else {
            let scale = new / old;
            Rgb([
                (px[0] as f32 * scale).clamp(0.0, 255.0) as u8,
                (px[1] as f32 * scale).clamp(0.0, 255.0) as u8,
                (px[2] as f32 * scale).clamp(0.0, 255.0) as u8,
            ])
        }
    });

    Ok(DynamicImage::ImageRgb8(out))
}

fn luminance(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y).0;
        let l = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        image::Luma([l.round().clamp(0.0, 255.0) as u8])
    })
}

/// Contrast-limited adaptive histogram equalization over a GRID×GRID tiling.
fn clahe(gray: &GrayImage) -> GrayImage {
    let (w, h) = (gray.width(), gray.height());
    let tile_w = w.div_ceil(GRID).max(1);
    let tile_h = h.div_ceil(GRID).max(1);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    // One clipped-histogram LUT per tile.
    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1));
        }
    }
    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as usize;

        // Position relative to tile centers, for bilinear blending.
        let fx = (x as f32 - tile_w as f32 / 2.0) / tile_w as f32;
        let fy = (y as f32 - tile_h as f32 / 2.0) / tile_h as f32;
        let tx0 = fx.floor().max(0.0) as u32;
        let ty0 = fy.floor().max(0.0) as u32;
        let tx0 = tx0.min(tiles_x - 1);
        let ty0 = ty0.min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wx = (fx - tx0 as f32).clamp(0.0, 1.0);
        let wy = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty0)[v] as f32 * wx;
        let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty1)[v] as f32 * wx;
        let blended = top * (1.0 - wy) + bottom * wy;
        image::Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped-histogram equalization mapping for one tile.
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let pixels = ((x1 - x0) * (y1 - y0)) as u32;
    if pixels == 0 {
        let mut identity = [0u8; 256];
        for (i, v) in identity.iter_mut().enumerate() {
            *v = i as u8;
        }
        return identity;
    }

    // Clip tall bins and redistribute the excess uniformly.
    let clip = ((CLIP_FACTOR * pixels as f32 / 256.0).ceil() as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let bonus = excess / 256;
    for bin in hist.iter_mut() {
        *bin += bonus;
    }

    // Cumulative distribution -> mapping, normalized by the clipped total.
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    let total: u32 = hist.iter().sum();
    let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min);
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = if denom == 0 {
            i as u8
        } else {
            ((cdf.saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0)
                .round()
                .clamp(0.0, 255.0) as u8
        };
    }
    lut
}
