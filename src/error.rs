use thiserror::Error;

/// Errors raised inside the pipeline. Expected failure modes (timeouts,
/// empty engine output, invalid input) are values, not panics; adapters and
/// stages inspect them to drive fallback decisions.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Engine '{engine}' timed out after {timeout_secs}s")]
    EngineTimeout { engine: String, timeout_secs: u64 },

    /// The engine produced text below the minimum viable length. The partial
    /// text is kept so the caller can apply the keep-longer fallback rule.
    #[error("Engine '{engine}' produced only {} chars of text", partial.len())]
    EngineEmpty { engine: String, partial: String },

    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Model endpoint error: {0}")]
    Http(String),

    #[error("Stage '{stage}' failed after {attempts} attempts: {source}")]
    StageRetryExhausted {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code for the run-level failure payload.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION",
            PipelineError::EngineTimeout { .. } => "ENGINE_TIMEOUT",
            PipelineError::EngineEmpty { .. } => "ENGINE_EMPTY_RESULT",
            PipelineError::UnsupportedDocument(_) => "UNSUPPORTED_DOCUMENT",
            PipelineError::Preprocess(_) => "PREPROCESSING_ERROR",
            PipelineError::Engine(_) => "ENGINE_ERROR",
            PipelineError::Http(_) => "MODEL_ENDPOINT_ERROR",
            PipelineError::StageRetryExhausted { .. } => "STAGE_RETRY_EXHAUSTED",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a stage driver may retry after this error. Validation and
    /// unsupported-document failures are final on first sight.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::UnsupportedDocument(_)
                | PipelineError::StageRetryExhausted { .. }
        )
    }
}

/// The only failure shape that crosses the pipeline boundary: which stage
/// failed, a stable error code, and a human-readable reason. Raw internal
/// errors never escape the run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineFailure {
    pub stage: String,
    pub kind: String,
    pub message: String,
}

impl PipelineFailure {
    pub fn new(stage: &str, error: &PipelineError) -> Self {
        Self {
            stage: stage.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] stage '{}': {}", self.kind, self.stage, self.message)
    }
}

impl std::error::Error for PipelineFailure {}
