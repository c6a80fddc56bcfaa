use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineError;

use super::TextCorrector;

/// Instructions for the character-level OCR correction pass. The receipt
/// text is appended below the marker line.
pub const CORRECTION_PROMPT: &str = "\
The following text was extracted from a retail receipt by OCR and may
contain character-level recognition errors (0/O, 1/l/I, 5/S, misplaced
decimal commas). Fix obvious recognition mistakes only. Do not reorder,
add or remove lines, and keep all amounts in their printed format.
Output only the corrected text.

Text:";

/// Build the full prompt for one correction call.
pub fn correction_prompt(text: &str) -> String {
    format!("{CORRECTION_PROMPT}\n{text}")
}

/// OpenAI-compatible chat-completions client used as the production
/// text-correction backend.
pub struct HttpTextCorrector {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpTextCorrector {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
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
impl TextCorrector for HttpTextCorrector {
    async fn correct(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Http(format!("correction request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http(format!("correction endpoint returned {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Http(format!("correction response decode failed: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| PipelineError::Http("correction response missing content".to_string()))
    }
}
