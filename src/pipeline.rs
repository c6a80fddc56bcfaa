//! Pipeline orchestration: fixed stage order, per-stage retries with
//! backoff, run statistics, and guaranteed temp-file cleanup.

use image::DynamicImage;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::engines::classical::ClassicalAdapter;
use crate::engines::document;
use crate::engines::fallback::FallbackAdapter;
use crate::engines::vision::VisionAdapter;
use crate::engines::{ClassicalOcr, FallbackOcr, TextCorrector, VisionModel};
use crate::error::{PipelineError, PipelineFailure};
use crate::fusion::ResultFusion;
use crate::postprocess::TextPostprocessor;
use crate::preprocessing::{Preprocessed, Preprocessor};
use crate::scoring::ConfidenceScorer;
use crate::stats::PipelineStatistics;
use crate::types::{
    Candidate, ExtractionRequest, ExtractionResponse, FileKind, PreprocessingSummary,
};

/// Builder for [`ReceiptPipeline`]. The classical backend is mandatory;
/// vision, fallback and correction backends are optional and injected.
pub struct PipelineBuilder {
    config: PipelineConfig,
    classical: Arc<dyn ClassicalOcr>,
    vision: Option<Arc<dyn VisionModel>>,
    fallback: Option<Arc<dyn FallbackOcr>>,
    corrector: Option<Arc<dyn TextCorrector>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig, classical: Arc<dyn ClassicalOcr>) -> Self {
        Self { config, classical, vision: None, fallback: None, corrector: None }
    }

    pub fn with_vision(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.vision = Some(model);
        self
    }

    pub fn with_fallback(mut self, backend: Arc<dyn FallbackOcr>) -> Self {
        self.fallback = Some(backend);
        self
    }

    pub fn with_corrector(mut self, corrector: Arc<dyn TextCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn build(self) -> ReceiptPipeline {
        let config = self.config;
        ReceiptPipeline {
            preprocessor: Preprocessor::new(&config),
            classical: ClassicalAdapter::new(self.classical, config.classical_baseline_confidence),
            vision: self
                .vision
                .map(|m| VisionAdapter::new(m, config.vision_timeout, config.min_text_len)),
            fallback: self.fallback.map(FallbackAdapter::new),
            fusion: ResultFusion::new(
                self.corrector,
                config.correction_timeout,
                config.correction_min_ratio,
            ),
            scorer: ConfidenceScorer::new(),
            postprocessor: TextPostprocessor::new(),
            engine_limiter: Arc::new(Semaphore::new(config.max_concurrent_engines)),
            stats: Mutex::new(PipelineStatistics::default()),
            config,
        }
    }
}

/// The receipt OCR extraction pipeline. One instance serves many runs;
/// statistics accumulate across them.
pub struct ReceiptPipeline {
    config: PipelineConfig,
    preprocessor: Preprocessor,
    classical: ClassicalAdapter,
    vision: Option<VisionAdapter>,
    fallback: Option<FallbackAdapter>,
    fusion: ResultFusion,
    scorer: ConfidenceScorer,
    postprocessor: TextPostprocessor,
    engine_limiter: Arc<Semaphore>,
    stats: Mutex<PipelineStatistics>,
}

impl ReceiptPipeline {
    pub fn builder(config: PipelineConfig, classical: Arc<dyn ClassicalOcr>) -> PipelineBuilder {
        PipelineBuilder::new(config, classical)
    }

    /// Execute one extraction run. The first stage to exhaust its retries
    /// aborts the run; the failure names the stage and carries a stable
    /// error code.
    pub async fn run(&self, request: ExtractionRequest) -> Result<ExtractionResponse, PipelineFailure> {
        let run_start = Instant::now();
        let outcome = self.run_inner(&request, run_start).await;

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.record_run(outcome.is_ok(), run_start.elapsed());
        drop(stats);

        match &outcome {
            Ok(response) => tracing::info!(
                confidence = response.confidence,
                chars = response.text.len(),
                engines = ?response.engines_used,
                elapsed_ms = response.processing_time_ms,
                "pipeline run complete"
            ),
            Err(failure) => tracing::error!(
                stage = %failure.stage,
                kind = %failure.kind,
                message = %failure.message,
                "pipeline run failed"
            ),
        }

        outcome
    }

    /// Snapshot of the accumulated statistics.
    pub fn statistics(&self) -> PipelineStatistics {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Operator action: clear all accumulated statistics.
    pub fn reset_statistics(&self) {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).reset();
    }

    async fn run_inner(
        &self,
        request: &ExtractionRequest,
        run_start: Instant,
    ) -> Result<ExtractionResponse, PipelineFailure> {
        let mut accumulator: BTreeMap<&'static str, serde_json::Value> = BTreeMap::new();

        let validated = self.run_stage("validate", || self.validate(request)).await?;
        accumulator.insert("validate", serde_json::json!({ "kind": request.kind.as_str() }));

        let preprocessed = self
            .run_stage("preprocess", || self.preprocess(validated.as_ref()))
            .await?;
        accumulator.insert(
            "preprocess",
            serde_json::json!({
                "operations": preprocessed.as_ref().map(|p| p.operations_applied.clone()).unwrap_or_default(),
            }),
        );

        let candidates = self
            .run_stage("recognize", || self.recognize(request, preprocessed.as_ref()))
            .await?;
        accumulator.insert(
            "recognize",
            serde_json::json!({
                "candidates": candidates.iter().map(|c| c.engine.clone()).collect::<Vec<_>>(),
            }),
        );

        let scored = self
            .run_stage("score", || self.score_candidates(&candidates, preprocessed.as_ref()))
            .await?;
        accumulator.insert(
            "score",
            serde_json::json!({
                "confidences": scored.iter().map(|c| c.confidence).collect::<Vec<_>>(),
            }),
        );

        let fused = self
            .run_stage("fuse", || async { Ok(self.fusion.fuse(&scored).await) })
            .await?;
        accumulator.insert("fuse", serde_json::json!({ "method": format!("{:?}", fused.method) }));

        let finalized = self
            .run_stage("postprocess", || async {
                Ok(self.postprocessor.postprocess(fused.clone()))
            })
            .await?;
        accumulator.insert("postprocess", serde_json::json!({ "confidence": finalized.confidence }));

        tracing::debug!(stages = ?accumulator, "run accumulator");

        // Aggregate run confidence: mean of the stage confidences that
        // report one (fusion and postprocessing).
        let confidence = (fused.confidence + finalized.confidence) / 2.0;

        let preprocessing = match &preprocessed {
            Some(p) => PreprocessingSummary {
                operations_applied: p.operations_applied.clone(),
                original_dimensions: Some(p.original_dimensions),
                final_dimensions: Some(p.final_dimensions),
                quality: Some(p.quality),
                processed_image_path: p.temp_path(),
            },
            None => PreprocessingSummary::skipped(),
        };

        // Temp-file cleanup. Earlier error paths release the file through
        // its drop guard; here the deletion outcome is logged. Cleanup
        // failure never changes the run result.
        if let Some(p) = preprocessed {
            if let Some(temp) = p.temp_file {
                if let Err(e) = temp.close() {
                    tracing::warn!(error = %e, "failed to remove processed-image temp file");
                }
            }
        }

        Ok(ExtractionResponse {
            text: finalized.text,
            confidence: confidence.clamp(0.0, 1.0),
            engines_used: finalized.engines_used,
            preprocessing,
            processing_time_ms: run_start.elapsed().as_millis() as u64,
        })
    }

    // ── Stage driver ─────────────────────────────────────────────────────

    /// Run one stage with retries. Retryable errors back off exponentially
    /// with jitter; non-retryable errors abort immediately. The first
    /// stage to fail ends the run.
    async fn run_stage<T, Fut>(
        &self,
        stage: &'static str,
        attempt: impl Fn() -> Fut,
    ) -> Result<T, PipelineFailure>
    where
        Fut: std::future::Future<Output = Result<T, PipelineError>>,
    {
        let stage_start = Instant::now();
        let max_attempts = self.config.max_retries + 1;
        let mut attempt_no = 0u32;

        loop {
            match attempt().await {
                Ok(value) => {
                    self.record_stage(stage, stage_start.elapsed());
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt_no + 1 < max_attempts => {
                    let delay = self.backoff_delay(attempt_no);
                    tracing::warn!(stage, attempt = attempt_no, error = %e, ?delay, "stage failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
                Err(e) => {
                    self.record_stage(stage, stage_start.elapsed());
                    let final_err = if e.is_retryable() {
                        PipelineError::StageRetryExhausted {
                            stage,
                            attempts: attempt_no + 1,
                            source: Box::new(e),
                        }
                    } else {
                        e
                    };
                    return Err(PipelineFailure::new(stage, &final_err));
                }
            }
        }
    }

    fn record_stage(&self, stage: &str, elapsed: Duration) {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_stage(stage, elapsed);
    }

    /// Exponential backoff with jitter: base × 2^attempt, capped, plus up
    /// to half the base of uniform jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay;
        let exp = base.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.config.retry_max_delay);
        let jitter_cap = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        capped + Duration::from_millis(jitter)
    }

    // ── Stages ───────────────────────────────────────────────────────────

    /// Decode and sanity-check the input. Image inputs must decode to a
    /// raster; document inputs must carry the PDF magic.
    async fn validate(&self, request: &ExtractionRequest) -> Result<Option<DynamicImage>, PipelineError> {
        if request.bytes.is_empty() {
            return Err(PipelineError::Validation("input bytes are empty".to_string()));
        }

        match request.kind {
            FileKind::Image => {
                let img = image::load_from_memory(&request.bytes)
                    .map_err(|e| PipelineError::Validation(format!("unreadable image: {e}")))?;
                Ok(Some(img))
            }
            FileKind::Document => {
                if !document::is_pdf(&request.bytes) {
                    return Err(PipelineError::UnsupportedDocument(
                        "document input is not a PDF".to_string(),
                    ));
                }
                Ok(None)
            }
        }
    }

    /// Raster cleanup. Documents pass through untouched; the preprocessor
    /// itself is fail-open and never errors.
    async fn preprocess(&self, image: Option<&DynamicImage>) -> Result<Option<Preprocessed>, PipelineError> {
        Ok(image.map(|img| self.preprocessor.process(img.clone())))
    }

    /// Run the engine ensemble and collect candidates.
    async fn recognize(
        &self,
        request: &ExtractionRequest,
        preprocessed: Option<&Preprocessed>,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let mut candidates = match preprocessed {
            Some(p) => self.recognize_image(p).await?,
            None => self.recognize_document(request).await?,
        };

        if candidates.is_empty() {
            if let Some(fallback_text) = request.fallback_text.as_deref() {
                if !fallback_text.trim().is_empty() {
                    tracing::info!("all engines failed, using caller-supplied fallback text");
                    candidates.push(Candidate::new(
                        "fallback-text",
                        fallback_text,
                        0.0,
                        Duration::ZERO,
                    ));
                }
            }
        }

        if candidates.is_empty() {
            return Err(PipelineError::Engine(
                "all recognition engines failed to produce text".to_string(),
            ));
        }

        Ok(candidates)
    }

    /// Concurrent classical + vision fan-out over a raster image, joined
    /// and aggregated afterwards. A vision timeout or short result never
    /// fails the stage; the classical output covers it.
    async fn recognize_image(&self, preprocessed: &Preprocessed) -> Result<Vec<Candidate>, PipelineError> {
        let classical_fut = self.classical.recognize(&preprocessed.image);
        let vision_fut = self.run_vision(preprocessed);
        let (classical_res, vision_res) = futures::future::join(classical_fut, vision_fut).await;

        let mut candidates = Vec::new();
        let classical_len = match classical_res {
            Ok(candidate) => {
                let len = candidate.text.trim().len();
                candidates.push(candidate);
                len
            }
            Err(e) => {
                tracing::warn!(error = %e, "classical engine failed");
                0
            }
        };

        match vision_res {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(PipelineError::EngineEmpty { engine, partial }) => {
                // Keep whichever is longer: the partial vision output or
                // the classical text (already collected above).
                if partial.trim().len() > classical_len {
                    tracing::warn!(engine = %engine, "vision output short but longer than classical, keeping it");
                    candidates.push(Candidate::new(engine, partial, 0.0, Duration::ZERO));
                } else {
                    tracing::warn!(engine = %engine, "vision output short, classical text covers it");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "vision engine failed, classical text covers it");
            }
        }

        Ok(candidates)
    }

    async fn run_vision(&self, preprocessed: &Preprocessed) -> Result<Option<Candidate>, PipelineError> {
        let Some(vision) = &self.vision else {
            return Ok(None);
        };

        let permit = self
            .engine_limiter
            .acquire()
            .await
            .map_err(|e| PipelineError::Internal(format!("engine limiter closed: {e}")))?;

        let png = match preprocessed.temp_file.as_ref() {
            Some(file) => tokio::fs::read(file.path())
                .await
                .map_err(|e| PipelineError::Internal(format!("failed to read processed image: {e}")))?,
            None => encode_png(&preprocessed.image)?,
        };

        let result = vision.recognize(&png).await;
        drop(permit);
        result.map(Some)
    }

    /// Classical-only route for non-raster documents. Vision models are
    /// never consulted here.
    async fn recognize_document(&self, request: &ExtractionRequest) -> Result<Vec<Candidate>, PipelineError> {
        let start = Instant::now();
        let backend = self.classical.backend();
        let bytes = request.bytes.clone();
        let min_text_len = self.config.min_text_len;

        let text = tokio::task::spawn_blocking(move || {
            document::extract(&bytes, backend.as_ref(), min_text_len)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("document task panicked: {e}")))??;

        Ok(vec![Candidate::new(
            self.classical.name(),
            text,
            self.config.classical_baseline_confidence,
            start.elapsed(),
        )])
    }

    /// Re-score every candidate's text, then consult the secondary
    /// fallback engine when the best score is below the trigger threshold.
    async fn score_candidates(
        &self,
        candidates: &[Candidate],
        preprocessed: Option<&Preprocessed>,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let mut scored: Vec<Candidate> = candidates
            .iter()
            .map(|c| c.rescored(self.scorer.score(&c.text)))
            .collect();

        let best = scored.iter().map(|c| c.confidence).fold(0.0f32, f32::max);
        if best < self.config.fallback_trigger_threshold {
            if let (Some(adapter), Some(p)) = (&self.fallback, preprocessed) {
                tracing::info!(best, threshold = self.config.fallback_trigger_threshold, "consulting fallback engine");
                match adapter.recognize(&p.image).await {
                    // Appended last: fusion's strict-max rule lets it win
                    // only when its confidence is strictly higher.
                    Ok(candidate) => scored.push(candidate),
                    Err(e) => tracing::warn!(error = %e, "fallback engine failed"),
                }
            }
        }

        Ok(scored)
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::Internal(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}
