use serde::Serialize;
use std::time::Duration;

/// Input kind, declared by the caller. Non-raster documents are routed to
/// the classical recognizer only and never reach vision models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Document,
}

impl FileKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image" => Some(Self::Image),
            "document" | "pdf" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// One pipeline run's input. Lives only for the duration of the run.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub bytes: Vec<u8>,
    pub kind: FileKind,
    /// Caller-supplied text (e.g. an accompanying email body) used as a
    /// last-resort candidate when every engine fails to produce output.
    pub fallback_text: Option<String>,
}

impl ExtractionRequest {
    pub fn image(bytes: Vec<u8>) -> Self {
        Self { bytes, kind: FileKind::Image, fallback_text: None }
    }

    pub fn document(bytes: Vec<u8>) -> Self {
        Self { bytes, kind: FileKind::Document, fallback_text: None }
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = Some(text.into());
        self
    }
}

/// One engine's recognition output. Immutable once created; the scoring
/// stage builds new candidates rather than mutating these.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub engine: String,
    pub text: String,
    /// Always within [0, 1]; clamped at construction.
    pub confidence: f32,
    pub latency: Duration,
}

impl Candidate {
    pub fn new(engine: impl Into<String>, text: impl Into<String>, confidence: f32, latency: Duration) -> Self {
        Self {
            engine: engine.into(),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            latency,
        }
    }

    /// Copy with a replacement confidence (used by the scoring stage).
    pub fn rescored(&self, confidence: f32) -> Self {
        Self {
            engine: self.engine.clone(),
            text: self.text.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            latency: self.latency,
        }
    }
}

/// How the fused result was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    None,
    Single,
    ConfidenceBased,
}

/// The single fused recognition result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct FusionResult {
    pub text: String,
    pub confidence: f32,
    pub engines_used: Vec<String>,
    pub method: FusionMethod,
}

impl FusionResult {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            engines_used: Vec::new(),
            method: FusionMethod::None,
        }
    }
}

/// Summary of the preprocessing stage included in the response.
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingSummary {
    pub operations_applied: Vec<String>,
    pub original_dimensions: Option<(u32, u32)>,
    pub final_dimensions: Option<(u32, u32)>,
    pub quality: Option<crate::preprocessing::QualityMetrics>,
    /// Path of the processed-image temp file. The file itself is removed
    /// before the run returns; the path is diagnostic only.
    pub processed_image_path: Option<std::path::PathBuf>,
}

impl PreprocessingSummary {
    pub fn skipped() -> Self {
        Self {
            operations_applied: Vec::new(),
            original_dimensions: None,
            final_dimensions: None,
            quality: None,
            processed_image_path: None,
        }
    }
}

/// Successful run output.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResponse {
    pub text: String,
    pub confidence: f32,
    pub engines_used: Vec<String>,
    pub preprocessing: PreprocessingSummary,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_clamps_confidence() {
        let c = Candidate::new("ocrs", "text", 1.4, Duration::from_millis(5));
        assert_eq!(c.confidence, 1.0);
        let c = Candidate::new("ocrs", "text", -0.2, Duration::from_millis(5));
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn rescored_keeps_text_and_engine() {
        let c = Candidate::new("vision", "SUMA 10,00", 0.6, Duration::from_millis(100));
        let r = c.rescored(0.9);
        assert_eq!(r.engine, "vision");
        assert_eq!(r.text, "SUMA 10,00");
        assert_eq!(r.confidence, 0.9);
    }

    #[test]
    fn file_kind_parses() {
        assert_eq!(FileKind::from_str("image"), Some(FileKind::Image));
        assert_eq!(FileKind::from_str("Document"), Some(FileKind::Document));
        assert_eq!(FileKind::from_str("pdf"), Some(FileKind::Document));
        assert_eq!(FileKind::from_str("video"), None);
    }

    #[test]
    fn empty_fusion_result() {
        let f = FusionResult::empty();
        assert_eq!(f.confidence, 0.0);
        assert_eq!(f.method, FusionMethod::None);
        assert!(f.text.is_empty());
    }
}
