use std::time::Duration;

/// All pipeline tunables in one immutable struct, passed to the
/// orchestrator at construction. Defaults match production settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Images larger than this on either axis are downscaled before OCR.
    pub max_dimension: u32,
    /// Skew below this angle (degrees) is left alone.
    pub deskew_min_angle: f32,
    /// Upper bound on one vision-model call.
    pub vision_timeout: Duration,
    /// Upper bound on one text-correction call.
    pub correction_timeout: Duration,
    /// Engine output shorter than this (chars, trimmed) counts as empty.
    pub min_text_len: usize,
    /// Confidence assigned to classical output before text scoring runs.
    pub classical_baseline_confidence: f32,
    /// Scored confidence below this triggers the secondary fallback engine.
    pub fallback_trigger_threshold: f32,
    /// Retries per stage beyond the first attempt.
    pub max_retries: u32,
    /// Base delay for stage-retry backoff (doubles per attempt, jittered).
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
    /// In-flight model calls during the recognize stage.
    pub max_concurrent_engines: usize,
    /// Corrected text must be at least this fraction of the original length.
    pub correction_min_ratio: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            deskew_min_angle: 0.5,
            vision_timeout: Duration::from_secs(60),
            correction_timeout: Duration::from_secs(30),
            min_text_len: 10,
            classical_baseline_confidence: 0.6,
            fallback_trigger_threshold: 0.55,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            max_concurrent_engines: 2,
            correction_min_ratio: 0.5,
        }
    }
}
