//! paragon-ocr: receipt OCR extraction pipeline.
//!
//! Turns a raw scanned or photographed receipt into clean,
//! confidence-scored text: deterministic image preprocessing, an ensemble
//! of recognition engines with cascading fallbacks, heuristic confidence
//! scoring, result fusion with an optional model-based correction pass,
//! and line-level postprocessing, orchestrated as a retryable run with
//! process-wide statistics.
//!
//! ```no_run
//! use std::sync::Arc;
//! use paragon_ocr::{ExtractionRequest, PipelineConfig, ReceiptPipeline};
//! use paragon_ocr::engines::mock::MockClassical;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = ReceiptPipeline::builder(
//!     PipelineConfig::default(),
//!     Arc::new(MockClassical::returning("SUMA PLN 17,57")),
//! )
//! .build();
//!
//! let response = pipeline
//!     .run(ExtractionRequest::image(std::fs::read("receipt.jpg")?))
//!     .await?;
//! println!("{} ({:.2})", response.text, response.confidence);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engines;
pub mod error;
pub mod fusion;
pub mod pipeline;
pub mod postprocess;
pub mod preprocessing;
pub mod scoring;
pub mod stats;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineFailure};
pub use pipeline::{PipelineBuilder, ReceiptPipeline};
pub use scoring::ConfidenceScorer;
pub use stats::PipelineStatistics;
pub use types::{
    Candidate, ExtractionRequest, ExtractionResponse, FileKind, FusionMethod, FusionResult,
};
