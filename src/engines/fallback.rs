use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

use crate::error::PipelineError;
use crate::types::Candidate;

use super::FallbackOcr;

/// Wraps the secondary recognizer consulted when the scored confidence of
/// the best candidate falls below the configured threshold. Its candidate
/// carries the backend's own confidence; fusion keeps it only when that
/// confidence is strictly higher.
pub struct FallbackAdapter {
    backend: Arc<dyn FallbackOcr>,
}

impl FallbackAdapter {
    pub fn new(backend: Arc<dyn FallbackOcr>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn recognize(&self, image: &DynamicImage) -> Result<Candidate, PipelineError> {
        let start = Instant::now();
        let name = self.backend.name();
        let backend = Arc::clone(&self.backend);
        let img = image.clone();

        let (text, confidence) = tokio::task::spawn_blocking(move || backend.recognize(&img))
            .await
            .map_err(|e| PipelineError::Internal(format!("fallback OCR task panicked: {e}")))??;

        let latency = start.elapsed();
        tracing::debug!(engine = name, confidence, chars = text.len(), ?latency, "fallback recognition done");

        Ok(Candidate::new(name, text, confidence, latency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockFallback;

    #[tokio::test]
    async fn carries_backend_confidence() {
        let backend = Arc::new(MockFallback::returning("RAZEM 9,99", 0.82));
        let adapter = FallbackAdapter::new(backend.clone());
        let img = DynamicImage::new_luma8(4, 4);

        let candidate = adapter.recognize(&img).await.unwrap();
        assert_eq!(candidate.text, "RAZEM 9,99");
        assert_eq!(candidate.confidence, 0.82);
        assert_eq!(backend.calls(), 1);
    }
}
