//! Ensemble fusion: choose the best candidate among the engines' outputs
//! and optionally run a model-based text-correction pass over it.

use std::sync::Arc;
use std::time::Duration;

use crate::engines::correction::correction_prompt;
use crate::engines::TextCorrector;
use crate::types::{Candidate, FusionMethod, FusionResult};

pub struct ResultFusion {
    corrector: Option<Arc<dyn TextCorrector>>,
    correction_timeout: Duration,
    /// Corrected text shorter than this fraction of the original is
    /// discarded as truncated or garbled.
    correction_min_ratio: f32,
}

impl ResultFusion {
    pub fn new(
        corrector: Option<Arc<dyn TextCorrector>>,
        correction_timeout: Duration,
        correction_min_ratio: f32,
    ) -> Self {
        Self { corrector, correction_timeout, correction_min_ratio }
    }

    pub async fn fuse(&self, candidates: &[Candidate]) -> FusionResult {
        if candidates.is_empty() {
            return FusionResult::empty();
        }

        let engines_used = engines_in_order(candidates);

        if candidates.len() == 1 {
            let only = &candidates[0];
            let text = self.maybe_correct(&only.text).await;
            return FusionResult {
                text,
                confidence: only.confidence,
                engines_used,
                method: FusionMethod::Single,
            };
        }

        // Strict maximum among positive confidences; ties keep the
        // first-seen candidate. If nothing scored above zero, fall back to
        // the first candidate regardless.
        let mut best: Option<&Candidate> = None;
        for candidate in candidates {
            if candidate.confidence > 0.0
                && best.map_or(true, |b| candidate.confidence > b.confidence)
            {
                best = Some(candidate);
            }
        }
        let selected = best.unwrap_or(&candidates[0]);

        tracing::debug!(
            engine = %selected.engine,
            confidence = selected.confidence,
            total = candidates.len(),
            "selected fusion candidate"
        );

        let text = self.maybe_correct(&selected.text).await;
        FusionResult {
            text,
            confidence: selected.confidence,
            engines_used,
            method: FusionMethod::ConfidenceBased,
        }
    }

    /// Run the correction pass when a corrector is configured. The
    /// original text survives any failure, timeout, or suspiciously short
    /// correction.
    async fn maybe_correct(&self, text: &str) -> String {
        let Some(corrector) = &self.corrector else {
            return text.to_string();
        };
        if text.trim().is_empty() {
            return text.to_string();
        }

        let prompt = correction_prompt(text);
        let outcome = tokio::time::timeout(self.correction_timeout, corrector.correct(&prompt)).await;

        match outcome {
            Ok(Ok(corrected)) => {
                let min_len = (text.len() as f32 * self.correction_min_ratio) as usize;
                if corrected.len() >= min_len {
                    corrected
                } else {
                    tracing::warn!(
                        original_len = text.len(),
                        corrected_len = corrected.len(),
                        "correction output too short, keeping original"
                    );
                    text.to_string()
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "correction call failed, keeping original");
                text.to_string()
            }
            Err(_) => {
                tracing::warn!("correction call timed out, keeping original");
                text.to_string()
            }
        }
    }
}

fn engines_in_order(candidates: &[Candidate]) -> Vec<String> {
    let mut engines = Vec::new();
    for candidate in candidates {
        if !engines.contains(&candidate.engine) {
            engines.push(candidate.engine.clone());
        }
    }
    engines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockCorrector;
    use std::time::Duration;

    fn candidate(engine: &str, text: &str, confidence: f32) -> Candidate {
        Candidate::new(engine, text, confidence, Duration::from_millis(10))
    }

    fn plain_fusion() -> ResultFusion {
        ResultFusion::new(None, Duration::from_secs(5), 0.5)
    }

    fn fusion_with(corrector: Arc<MockCorrector>) -> ResultFusion {
        ResultFusion::new(Some(corrector), Duration::from_secs(5), 0.5)
    }

    #[tokio::test]
    async fn zero_candidates_yield_empty_result() {
        let result = plain_fusion().fuse(&[]).await;
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, FusionMethod::None);
        assert!(result.engines_used.is_empty());
    }

    #[tokio::test]
    async fn single_candidate_preserves_confidence_exactly() {
        let corrector = Arc::new(MockCorrector::returning("SUMA PLN 17,57 corrected text"));
        let fusion = fusion_with(corrector);
        let result = fusion
            .fuse(&[candidate("ocrs", "SUMA PLN 17,57 original", 0.73)])
            .await;

        assert_eq!(result.confidence, 0.73);
        assert_eq!(result.method, FusionMethod::Single);
        // The correction pass may change text, never confidence.
        assert_eq!(result.text, "SUMA PLN 17,57 corrected text");
    }

    #[tokio::test]
    async fn highest_confidence_candidate_wins() {
        let result = plain_fusion()
            .fuse(&[candidate("ocrs", "low", 0.4), candidate("vision", "high", 0.8)])
            .await;

        assert_eq!(result.text, "high");
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.method, FusionMethod::ConfidenceBased);
        assert_eq!(result.engines_used, vec!["ocrs", "vision"]);
    }

    #[tokio::test]
    async fn ties_keep_the_first_seen_candidate() {
        let result = plain_fusion()
            .fuse(&[candidate("a", "first", 0.6), candidate("b", "second", 0.6)])
            .await;
        assert_eq!(result.text, "first");
    }

    #[tokio::test]
    async fn all_zero_confidence_falls_back_to_first() {
        let result = plain_fusion()
            .fuse(&[candidate("a", "first", 0.0), candidate("b", "second", 0.0)])
            .await;
        assert_eq!(result.text, "first");
        assert_eq!(result.method, FusionMethod::ConfidenceBased);
    }

    #[tokio::test]
    async fn truncated_correction_is_rejected() {
        let corrector = Arc::new(MockCorrector::returning("ok"));
        let fusion = fusion_with(corrector);
        let original = "SUMA PLN 17,57 a perfectly reasonable receipt line";
        let result = fusion.fuse(&[candidate("ocrs", original, 0.7)]).await;
        assert_eq!(result.text, original);
    }

    #[tokio::test]
    async fn failed_correction_keeps_original() {
        let corrector = Arc::new(MockCorrector::failing("endpoint down"));
        let fusion = fusion_with(corrector.clone());
        let result = fusion.fuse(&[candidate("ocrs", "SUMA PLN 17,57", 0.7)]).await;
        assert_eq!(result.text, "SUMA PLN 17,57");
        assert_eq!(corrector.calls(), 1);
    }
}
