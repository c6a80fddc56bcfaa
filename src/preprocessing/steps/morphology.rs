use crate::error::PipelineError;
use image::DynamicImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::open;

/// Text-region enhancement: a grayscale morphological opening (erode then
/// dilate) that removes small bright noise blobs while leaving character
/// strokes intact. Runs last, so the pipeline output is grayscale.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PipelineError> {
    let gray = image.to_luma8();
    let opened = open(&gray, Norm::LInf, 1);
    Ok(DynamicImage::ImageLuma8(opened))
}
