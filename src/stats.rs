use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Timing accumulator for one pipeline stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageStats {
    pub count: u64,
    pub total_time_ms: u64,
    pub avg_time_ms: f64,
}

impl StageStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total_time_ms += elapsed.as_millis() as u64;
        self.avg_time_ms = self.total_time_ms as f64 / self.count as f64;
    }
}

/// Process-wide run statistics. Created with the orchestrator, updated
/// after every run, read by health checks, and reset only on explicit
/// operator action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatistics {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_time_ms: u64,
    pub per_stage: BTreeMap<String, StageStats>,
}

impl PipelineStatistics {
    pub fn record_stage(&mut self, stage: &str, elapsed: Duration) {
        self.per_stage.entry(stage.to_string()).or_default().record(elapsed);
    }

    pub fn record_run(&mut self, success: bool, elapsed: Duration) {
        self.total_processed += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.total_time_ms += elapsed.as_millis() as u64;
    }

    /// Operator-initiated reset. Never called by the pipeline itself.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
