use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::types::Candidate;

use super::VisionModel;

/// Receipt-specific transcription instructions sent with every image.
pub const RECEIPT_PROMPT: &str = "\
Transcribe this retail receipt exactly as printed, reading top to bottom.
Keep one receipt line per output line and preserve the original order.
Normalize prices to the printed decimal format (e.g. 17,57) without
inventing digits. Include store name, items, quantities, totals, tax
lines, dates and fiscal markers. Output only the transcription.";

/// Wraps a vision-capable model endpoint. Every call is bounded by the
/// configured timeout; output below the minimum viable length surfaces as
/// `EngineEmpty` carrying the partial text so the recognize stage can keep
/// the longer of partial-vision and classical output.
pub struct VisionAdapter {
    model: Arc<dyn VisionModel>,
    timeout: Duration,
    min_text_len: usize,
}

impl VisionAdapter {
    pub fn new(model: Arc<dyn VisionModel>, timeout: Duration, min_text_len: usize) -> Self {
        Self { model, timeout, min_text_len }
    }

    pub fn name(&self) -> &'static str {
        self.model.name()
    }

    pub async fn recognize(&self, png: &[u8]) -> Result<Candidate, PipelineError> {
        let start = Instant::now();
        let name = self.model.name();

        let outcome = tokio::time::timeout(self.timeout, self.model.transcribe(RECEIPT_PROMPT, png)).await;
        let text = match outcome {
            Err(_) => {
                return Err(PipelineError::EngineTimeout {
                    engine: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(text)) => text,
        };

        let latency = start.elapsed();
        if text.trim().len() < self.min_text_len {
            return Err(PipelineError::EngineEmpty {
                engine: name.to_string(),
                partial: text,
            });
        }

        tracing::debug!(engine = name, chars = text.len(), ?latency, "vision recognition done");
        Ok(Candidate::new(name, text, 0.0, latency))
    }
}

/// OpenAI-compatible chat-completions client used as the production vision
/// backend. The image travels as a base64 `data:` URL in a multimodal
/// message.
pub struct HttpVisionModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpVisionModel {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn transcribe(&self, prompt: &str, png: &[u8]) -> Result<String, PipelineError> {
        let image_url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Http(format!("vision request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http(format!("vision endpoint returned {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Http(format!("vision response decode failed: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| PipelineError::Http("vision response missing content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockVision;

    #[tokio::test]
    async fn long_output_becomes_candidate() {
        let model = Arc::new(MockVision::returning("LIDL\nChleb 3,99\nSUMA PLN 3,99"));
        let adapter = VisionAdapter::new(model.clone(), Duration::from_secs(5), 10);

        let candidate = adapter.recognize(b"png").await.unwrap();
        assert_eq!(candidate.engine, "mock-vision");
        assert!(candidate.text.contains("Chleb"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn short_output_surfaces_partial_text() {
        let model = Arc::new(MockVision::returning("SUMA"));
        let adapter = VisionAdapter::new(model, Duration::from_secs(5), 10);

        match adapter.recognize(b"png").await {
            Err(PipelineError::EngineEmpty { partial, .. }) => assert_eq!(partial, "SUMA"),
            other => panic!("expected EngineEmpty, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(MockVision::stalling(Duration::from_secs(10)));
        let adapter = VisionAdapter::new(model, Duration::from_millis(50), 10);

        match adapter.recognize(b"png").await {
            Err(PipelineError::EngineTimeout { timeout_secs, .. }) => assert_eq!(timeout_secs, 0),
            other => panic!("expected EngineTimeout, got {other:?}"),
        }
    }
}
