use image::{DynamicImage, GenericImageView, GrayImage};
use serde::Serialize;
use std::io::Write;
use tempfile::NamedTempFile;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

use super::steps;

/// Photometric diagnostics of the processed image. These feed operator
/// logs and the response summary; they are not confidence values.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QualityMetrics {
    pub mean_brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
}

/// Output of the preprocessing stage. The processed image is also written
/// to a temp file whose lifetime is the run; dropping this struct removes
/// the file on every exit path.
#[derive(Debug)]
pub struct Preprocessed {
    pub image: DynamicImage,
    pub temp_file: Option<NamedTempFile>,
    pub operations_applied: Vec<String>,
    pub quality: QualityMetrics,
    pub original_dimensions: (u32, u32),
    pub final_dimensions: (u32, u32),
}

impl Preprocessed {
    pub fn temp_path(&self) -> Option<std::path::PathBuf> {
        self.temp_file.as_ref().map(|f| f.path().to_path_buf())
    }

    /// Pass-through result for inputs that skip raster preprocessing.
    pub fn passthrough(image: DynamicImage) -> Self {
        let dims = image.dimensions();
        let quality = measure_quality(&image.to_luma8());
        Self {
            image,
            temp_file: None,
            operations_applied: Vec::new(),
            quality,
            original_dimensions: dims,
            final_dimensions: dims,
        }
    }
}

/// Deterministic geometric/photometric cleanup. Never fails: a step that
/// errors is skipped and the previous best image flows on; if everything
/// fails the original image is returned with an empty operations list.
pub struct Preprocessor {
    max_dimension: u32,
    deskew_min_angle: f32,
}

impl Preprocessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
            deskew_min_angle: config.deskew_min_angle,
        }
    }

    pub fn process(&self, image: DynamicImage) -> Preprocessed {
        let original_dimensions = image.dimensions();
        let mut operations = Vec::new();
        let mut img = image;

        img = run_step("resize", img, &mut operations, |i| {
            steps::resize::apply(i, self.max_dimension)
        });
        img = run_step("deskew", img, &mut operations, |i| {
            steps::deskew::apply(i, self.deskew_min_angle)
        });
        img = run_step("denoise", img, &mut operations, steps::denoise::apply);
        img = run_step("contrast", img, &mut operations, steps::contrast::apply);
        img = run_step("text_enhance", img, &mut operations, steps::morphology::apply);

        let quality = measure_quality(&img.to_luma8());
        let final_dimensions = img.dimensions();
        let temp_file = match write_temp_png(&img) {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist processed image, continuing in-memory");
                None
            }
        };

        tracing::debug!(
            ops = ?operations,
            brightness = quality.mean_brightness,
            contrast = quality.contrast,
            sharpness = quality.sharpness,
            "preprocessing complete"
        );

        Preprocessed {
            image: img,
            temp_file,
            operations_applied: operations,
            quality,
            original_dimensions,
            final_dimensions,
        }
    }
}

fn run_step<F>(
    name: &str,
    img: DynamicImage,
    operations: &mut Vec<String>,
    step_fn: F,
) -> DynamicImage
where
    F: FnOnce(DynamicImage) -> Result<DynamicImage, PipelineError>,
{
    let fallback = img.clone();
    match step_fn(img) {
        Ok(processed) => {
            operations.push(name.to_string());
            processed
        }
        Err(e) => {
            tracing::warn!(step = name, error = %e, "preprocessing step failed, skipping");
            fallback
        }
    }
}

fn write_temp_png(img: &DynamicImage) -> Result<NamedTempFile, PipelineError> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::Preprocess(format!("PNG encode failed: {e}")))?;

    let mut file = tempfile::Builder::new()
        .prefix("paragon-ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| PipelineError::Internal(format!("temp file creation failed: {e}")))?;
    file.write_all(&buf)
        .map_err(|e| PipelineError::Internal(format!("temp file write failed: {e}")))?;
    Ok(file)
}

fn measure_quality(gray: &GrayImage) -> QualityMetrics {
    let n = (gray.width() * gray.height()) as f32;
    if n == 0.0 {
        return QualityMetrics { mean_brightness: 0.0, contrast: 0.0, sharpness: 0.0 };
    }

    let mean = gray.pixels().map(|p| p.0[0] as f32).sum::<f32>() / n;
    let variance = gray
        .pixels()
        .map(|p| {
            let d = p.0[0] as f32 - mean;
            d * d
        })
        .sum::<f32>()
        / n;

    QualityMetrics {
        mean_brightness: mean,
        contrast: variance.sqrt(),
        sharpness: laplacian_variance(gray),
    }
}

/// Variance of the Laplacian response; low values indicate blur.
fn laplacian_variance(gray: &GrayImage) -> f32 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f32;
    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f32;
    let mean = responses.iter().sum::<f32>() / n;
    responses.iter().map(|r| (r - mean) * (r - mean)).sum::<f32>() / n
}
