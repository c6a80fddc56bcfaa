//! Pure-Rust classical recognizer backed by the ocrs neural models.
//! No system dependencies; models are downloaded to the cache directory on
//! first use.

use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PipelineError;

use super::ClassicalOcr;

const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// Classical OCR backend wrapping the ocrs engine.
pub struct OcrsClassical {
    engine: Arc<OcrEngine>,
}

impl OcrsClassical {
    /// Create the backend, downloading models if they are not cached.
    pub fn new() -> Result<Self, PipelineError> {
        tracing::info!("initializing ocrs classical engine");

        let detection_path = ensure_model_downloaded(DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_path =
            ensure_model_downloaded(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_path)
            .map_err(|e| PipelineError::Engine(format!("failed to load detection model: {e}")))?;
        let recognition_model = Model::load_file(&recognition_path)
            .map_err(|e| PipelineError::Engine(format!("failed to load recognition model: {e}")))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| PipelineError::Engine(format!("failed to create ocrs engine: {e}")))?;

        tracing::info!("ocrs classical engine ready");
        Ok(Self { engine: Arc::new(engine) })
    }
}

impl ClassicalOcr for OcrsClassical {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, PipelineError> {
        let rgb = image.to_rgb8();
        let dimensions = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), dimensions)
            .map_err(|e| PipelineError::Engine(format!("failed to create image source: {e}")))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| PipelineError::Engine(format!("failed to prepare input: {e}")))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| PipelineError::Engine(format!("failed to detect words: {e}")))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let line_texts = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| PipelineError::Engine(format!("failed to recognize text: {e}")))?;

        let text = line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                line.words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text)
    }
}

/// Download a model into the cache directory unless already present.
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<PathBuf, PipelineError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("paragon-ocr");

    std::fs::create_dir_all(&cache_dir)
        .map_err(|e| PipelineError::Internal(format!("failed to create cache directory: {e}")))?;

    let model_path = cache_dir.join(filename);
    if !model_path.exists() {
        tracing::info!(filename, "downloading ocrs model");
        download_file(url, &model_path)?;
    } else {
        tracing::debug!(?model_path, "using cached ocrs model");
    }

    Ok(model_path)
}

fn download_file(url: &str, path: &Path) -> Result<(), PipelineError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| PipelineError::Http(format!("model download failed: {e}")))?;

    let buffer = response
        .into_body()
        .read_to_vec()
        .map_err(|e| PipelineError::Http(format!("model download read failed: {e}")))?;

    let mut file = File::create(path)
        .map_err(|e| PipelineError::Internal(format!("failed to create model file: {e}")))?;
    file.write_all(&buffer)
        .map_err(|e| PipelineError::Internal(format!("failed to write model file: {e}")))?;

    Ok(())
}
