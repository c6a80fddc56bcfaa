//! Tesseract secondary recognizer, statically linked. Better on noisy
//! phone photos than the neural classical engine; consulted only when the
//! scored confidence of the primary result is low. Tessdata is downloaded
//! to the cache directory on first use.

use image::DynamicImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tesseract_static::tesseract::Tesseract;

use crate::error::PipelineError;

use super::FallbackOcr;

/// Secondary OCR backend reporting Tesseract's own mean confidence.
pub struct TesseractFallback {
    tessdata_path: String,
    language: String,
}

impl TesseractFallback {
    pub fn new(language: &str) -> Result<Self, PipelineError> {
        let tessdata_path = ensure_tessdata_available(language)?;

        // Probe initialization so construction fails loudly, not mid-run.
        let probe = Tesseract::new(Some(&tessdata_path), Some(language))
            .map_err(|e| PipelineError::Engine(format!("failed to initialize Tesseract: {e}")))?;
        drop(probe);

        tracing::info!(tessdata = %tessdata_path, language, "tesseract fallback engine ready");
        Ok(Self { tessdata_path, language: language.to_string() })
    }
}

impl FallbackOcr for TesseractFallback {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<(String, f32), PipelineError> {
        // BMP is always understood by leptonica, so hand the image over
        // in-memory without touching the filesystem.
        let rgb = image.to_rgb8();
        let mut bmp = Vec::new();
        rgb.write_to(&mut std::io::Cursor::new(&mut bmp), image::ImageFormat::Bmp)
            .map_err(|e| PipelineError::Engine(format!("BMP conversion failed: {e}")))?;

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| PipelineError::Engine(format!("failed to create Tesseract: {e}")))?;
        tess = tess
            .set_image_from_mem(&bmp)
            .map_err(|e| PipelineError::Engine(format!("failed to set image: {e}")))?;
        tess = tess
            .recognize()
            .map_err(|e| PipelineError::Engine(format!("recognition failed: {e}")))?;

        let text = tess
            .get_text()
            .map_err(|e| PipelineError::Engine(format!("failed to read text: {e}")))?;
        let confidence = tess.mean_text_conf() as f32 / 100.0;

        Ok((text.trim().to_string(), confidence))
    }
}

/// Ensure the traineddata for `language` is cached, downloading if needed.
/// Returns the tessdata directory path.
fn ensure_tessdata_available(language: &str) -> Result<String, PipelineError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("paragon-ocr")
        .join("tessdata");

    std::fs::create_dir_all(&cache_dir)
        .map_err(|e| PipelineError::Internal(format!("failed to create tessdata directory: {e}")))?;

    let traineddata_path = cache_dir.join(format!("{language}.traineddata"));
    if !traineddata_path.exists() {
        // tessdata_fast: smaller download, adequate accuracy for receipts.
        let url = format!(
            "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{language}.traineddata"
        );
        tracing::info!(language, "downloading tessdata");
        download_file(&url, &traineddata_path)?;
    }

    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::Internal("invalid tessdata path".to_string()))
}

fn download_file(url: &str, path: &Path) -> Result<(), PipelineError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| PipelineError::Http(format!("tessdata download failed: {e}")))?;

    let buffer = response
        .into_body()
        .read_to_vec()
        .map_err(|e| PipelineError::Http(format!("tessdata read failed: {e}")))?;

    let mut file = File::create(path)
        .map_err(|e| PipelineError::Internal(format!("failed to create tessdata file: {e}")))?;
    file.write_all(&buffer)
        .map_err(|e| PipelineError::Internal(format!("failed to write tessdata file: {e}")))?;

    Ok(())
}
