use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;

use crate::error::PipelineError;
use crate::types::Candidate;

use super::ClassicalOcr;

/// Wraps a synchronous classical backend into the candidate-producing
/// contract. Recognition runs on the blocking pool; the candidate carries
/// the configured baseline confidence until the scoring stage replaces it.
pub struct ClassicalAdapter {
    backend: Arc<dyn ClassicalOcr>,
    baseline_confidence: f32,
}

impl ClassicalAdapter {
    pub fn new(backend: Arc<dyn ClassicalOcr>, baseline_confidence: f32) -> Self {
        Self { backend, baseline_confidence }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> Arc<dyn ClassicalOcr> {
        Arc::clone(&self.backend)
    }

    pub async fn recognize(&self, image: &DynamicImage) -> Result<Candidate, PipelineError> {
        let start = Instant::now();
        let name = self.backend.name();
        let backend = Arc::clone(&self.backend);
        let img = image.clone();

        let text = tokio::task::spawn_blocking(move || backend.recognize(&img))
            .await
            .map_err(|e| PipelineError::Internal(format!("classical OCR task panicked: {e}")))??;

        let latency = start.elapsed();
        tracing::debug!(engine = name, chars = text.len(), ?latency, "classical recognition done");

        Ok(Candidate::new(name, text, self.baseline_confidence, latency))
    }
}
