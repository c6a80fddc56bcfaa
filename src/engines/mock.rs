//! Test doubles for the recognition backends. Always compiled so the
//! integration tests (and downstream consumers' tests) can drive the
//! pipeline without any real engine or network access.

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::PipelineError;

use super::{ClassicalOcr, FallbackOcr, TextCorrector, VisionModel};

enum Reply {
    Text(String),
    Fail(String),
    Stall(Duration),
}

impl Reply {
    async fn resolve_async(&self, engine: &str) -> Result<String, PipelineError> {
        match self {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail(msg) => Err(PipelineError::Engine(format!("{engine}: {msg}"))),
            Reply::Stall(d) => {
                tokio::time::sleep(*d).await;
                Ok(String::new())
            }
        }
    }

    fn resolve(&self, engine: &str) -> Result<String, PipelineError> {
        match self {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail(msg) => Err(PipelineError::Engine(format!("{engine}: {msg}"))),
            Reply::Stall(d) => {
                std::thread::sleep(*d);
                Ok(String::new())
            }
        }
    }
}

/// Classical backend double returning a preset string and counting calls.
pub struct MockClassical {
    reply: Reply,
    calls: AtomicUsize,
}

impl MockClassical {
    pub fn returning(text: impl Into<String>) -> Self {
        Self { reply: Reply::Text(text.into()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Reply::Fail(message.into()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassicalOcr for MockClassical {
    fn name(&self) -> &'static str {
        "mock-classical"
    }

    fn recognize(&self, _image: &DynamicImage) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.resolve(self.name())
    }
}

/// Vision backend double: preset text, failure, or an artificial stall to
/// trigger adapter timeouts. Counts calls so tests can assert the document
/// gate never touches it.
pub struct MockVision {
    reply: Reply,
    calls: AtomicUsize,
}

impl MockVision {
    pub fn returning(text: impl Into<String>) -> Self {
        Self { reply: Reply::Text(text.into()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Reply::Fail(message.into()), calls: AtomicUsize::new(0) }
    }

    pub fn stalling(delay: Duration) -> Self {
        Self { reply: Reply::Stall(delay), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for MockVision {
    fn name(&self) -> &'static str {
        "mock-vision"
    }

    async fn transcribe(&self, _prompt: &str, _png: &[u8]) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.resolve_async(self.name()).await
    }
}

/// Secondary-recognizer double with a preset text and self-reported
/// confidence.
pub struct MockFallback {
    text: String,
    confidence: f32,
    calls: AtomicUsize,
}

impl MockFallback {
    pub fn returning(text: impl Into<String>, confidence: f32) -> Self {
        Self { text: text.into(), confidence, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FallbackOcr for MockFallback {
    fn name(&self) -> &'static str {
        "mock-fallback"
    }

    fn recognize(&self, _image: &DynamicImage) -> Result<(String, f32), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.text.clone(), self.confidence))
    }
}

/// Corrector double returning a preset string or failing.
pub struct MockCorrector {
    reply: Reply,
    calls: AtomicUsize,
}

impl MockCorrector {
    pub fn returning(text: impl Into<String>) -> Self {
        Self { reply: Reply::Text(text.into()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { reply: Reply::Fail(message.into()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextCorrector for MockCorrector {
    async fn correct(&self, _prompt: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.resolve_async("mock-corrector").await
    }
}
