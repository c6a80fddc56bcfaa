//! Image preprocessing: deterministic cleanup applied before recognition.

pub mod pipeline;
pub mod steps;

pub use pipeline::{Preprocessed, Preprocessor, QualityMetrics};
