use crate::error::PipelineError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Downscale images that exceed the configured bound on either axis.
/// Aspect ratio is preserved; images already within bounds pass through.
pub fn apply(image: DynamicImage, max_dimension: u32) -> Result<DynamicImage, PipelineError> {
    let (width, height) = image.dimensions();

    if width <= max_dimension && height <= max_dimension {
        return Ok(image);
    }

    Ok(image.resize(max_dimension, max_dimension, FilterType::Lanczos3))
}
