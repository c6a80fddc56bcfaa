//! Heuristic confidence estimation for extracted receipt text,
//! independent of which engine produced it.

use regex::Regex;
use std::sync::OnceLock;

// ── Compiled regex cache ─────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_price, r"\b\d+[.,]\d{2}\b");
re!(re_currency, r"(?i)\b(pln|eur|usd|gbp|chf)\b|zł|[$€£]");
// Runs of three or more symbol characters indicate OCR corruption.
re!(re_garbage, r"[^\w\s]{3,}");

/// Receipt vocabulary: fiscal markers, totals, date/time markers and
/// courtesy footers, Polish first, English equivalents included.
const DOMAIN_KEYWORDS: &[&str] = &[
    "paragon fiskalny",
    "suma",
    "razem",
    "pln",
    "nip",
    "rabat",
    "sprzedaż",
    "data",
    "godz",
    "dziękujemy",
    "zapraszamy",
    "total",
    "thank you",
    "vat",
];

/// Merchant tokens that strongly suggest a readable receipt header.
const MERCHANT_TOKENS: &[&str] = &[
    "biedronka", "lidl", "żabka", "zabka", "carrefour", "auchan", "tesco",
    "kaufland", "netto", "aldi", "rossmann", "orlen", "dino",
];

const BASE_SCORE: f32 = 0.5;
const KEYWORD_WEIGHT: f32 = 0.3;
const STRUCTURAL_BONUS: f32 = 0.1;
const GARBAGE_PENALTY: f32 = 0.05;
const GARBAGE_PENALTY_CAP: f32 = 0.2;

/// Pure text-quality estimator. `score` is always within [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, text: &str) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }

        let lowered = text.to_lowercase();

        let matched = DOMAIN_KEYWORDS.iter().filter(|k| lowered.contains(*k)).count();
        let keyword_score = matched as f32 / DOMAIN_KEYWORDS.len() as f32 * KEYWORD_WEIGHT;

        let mut structural = 0.0;
        if re_price().is_match(text) {
            structural += STRUCTURAL_BONUS;
        }
        if re_currency().is_match(text) {
            structural += STRUCTURAL_BONUS;
        }
        if MERCHANT_TOKENS.iter().any(|m| lowered.contains(m)) {
            structural += STRUCTURAL_BONUS;
        }

        let garbage = re_garbage().find_iter(text).count() as f32;
        let penalty = (garbage * GARBAGE_PENALTY).min(GARBAGE_PENALTY_CAP);

        (BASE_SCORE + keyword_score + structural - penalty).clamp(0.0, 1.0)
    }
}
