//! Recognition backends and their adapters.
//!
//! Backends sit behind object-safe traits so the orchestrator is built by
//! injection and tests substitute doubles without global mutation. Adapters
//! wrap a backend into the uniform `Candidate`-producing contract the
//! pipeline consumes.

pub mod classical;
pub mod correction;
pub mod document;
pub mod fallback;
pub mod mock;
pub mod vision;

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::PipelineError;

/// Fast local text extraction, CPU-only. Always attempted first.
pub trait ClassicalOcr: Send + Sync {
    fn name(&self) -> &'static str;
    fn recognize(&self, image: &DynamicImage) -> Result<String, PipelineError>;
}

/// Vision-capable model endpoint. Receives a prompt plus PNG bytes and
/// returns the transcription. Network-bound; callers wrap it in a timeout.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn transcribe(&self, prompt: &str, png: &[u8]) -> Result<String, PipelineError>;
}

/// Secondary recognizer consulted only when scored confidence is low.
/// Reports its own confidence alongside the text.
pub trait FallbackOcr: Send + Sync {
    fn name(&self) -> &'static str;
    fn recognize(&self, image: &DynamicImage) -> Result<(String, f32), PipelineError>;
}

/// Correction-oriented language model used by result fusion.
#[async_trait]
pub trait TextCorrector: Send + Sync {
    async fn correct(&self, prompt: &str) -> Result<String, PipelineError>;
}
