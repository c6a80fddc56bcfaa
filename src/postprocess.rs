//! Final line-level cleanup and structural validation of the fused text.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::types::FusionResult;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_header_marker, r"(?i)paragon fiskalny|faktura|nip\b|receipt");
re!(re_price_line, r"\d+[.,]\d{2}");
re!(re_total_marker, r"(?i)\bsuma\b|\brazem\b|do zapłaty|\btotal\b");

const STRUCTURAL_BONUS: f32 = 0.05;

/// Cleans the fused text and applies structural-validation bonuses.
/// Confidence may only increase here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPostprocessor;

impl TextPostprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn postprocess(&self, fused: FusionResult) -> FusionResult {
        let text = dedup_lines(&fused.text);

        let mut bonus = 0.0;
        if re_header_marker().is_match(&text) {
            bonus += STRUCTURAL_BONUS;
        }
        if text.lines().any(|l| re_price_line().is_match(l)) {
            bonus += STRUCTURAL_BONUS;
        }
        if re_total_marker().is_match(&text) {
            bonus += STRUCTURAL_BONUS;
        }

        FusionResult {
            text,
            confidence: (fused.confidence + bonus).clamp(0.0, 1.0),
            engines_used: fused.engines_used,
            method: fused.method,
        }
    }
}

/// Trim lines, drop empties, and remove exact duplicates while keeping
/// the first occurrence in place.
fn dedup_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FusionMethod;

    fn fused(text: &str, confidence: f32) -> FusionResult {
        FusionResult {
            text: text.to_string(),
            confidence,
            engines_used: vec!["ocrs".to_string()],
            method: FusionMethod::Single,
        }
    }

    #[test]
    fn duplicate_lines_keep_first_occurrence() {
        let input = "Chleb 3,99\nMasło 7,49\nChleb 3,99\nSUMA PLN 11,48";
        let result = TextPostprocessor::new().postprocess(fused(input, 0.5));
        let lines: Vec<&str> = result.text.lines().collect();
        assert_eq!(lines.iter().filter(|l| **l == "Chleb 3,99").count(), 1);
        assert_eq!(lines[0], "Chleb 3,99");
    }

    #[test]
    fn whitespace_lines_are_dropped() {
        let input = "  Chleb 3,99  \n\n   \nSUMA PLN 3,99";
        let result = TextPostprocessor::new().postprocess(fused(input, 0.5));
        assert_eq!(result.text, "Chleb 3,99\nSUMA PLN 3,99");
    }

    #[test]
    fn structural_bonuses_accumulate() {
        let input = "PARAGON FISKALNY\nChleb 3,99\nSUMA PLN 3,99";
        let result = TextPostprocessor::new().postprocess(fused(input, 0.5));
        // Header + price line + total marker.
        assert!((result.confidence - 0.65).abs() < 1e-6, "got {}", result.confidence);
    }

    #[test]
    fn confidence_never_decreases() {
        let result = TextPostprocessor::new().postprocess(fused("nothing structural here", 0.42));
        assert!(result.confidence >= 0.42);
    }

    #[test]
    fn confidence_stays_clamped() {
        let input = "PARAGON FISKALNY\nChleb 3,99\nSUMA PLN 3,99";
        let result = TextPostprocessor::new().postprocess(fused(input, 0.98));
        assert_eq!(result.confidence, 1.0);
    }
}
