//! Document structure validator.
//!
//! Looks for identity-document vocabulary in OCR text and masks candidate
//! ID numbers before any text leaves the pipeline.
//!
//! `has_plausible_structure` is a heuristic: it only says the text contains
//! at least one word commonly printed on ID cards. It is not evidence that
//! the document is authentic and must never gate a verification.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Vocabulary scanned case-insensitively, in reporting order.
pub const KEYWORDS: [&str; 7] = [
    "Name",
    "DOB",
    "Date of Birth",
    "No",
    "ID",
    "REPUBLIC",
    "GOVERNMENT",
];

/// Replacement for every run of [`MIN_MASKED_DIGITS`] or more digits.
pub const MASK_TOKEN: &str = "********";
pub const MIN_MASKED_DIGITS: usize = 8;

/// Characters of masked text surfaced to callers.
pub const SAMPLE_CHARS: usize = 100;
const SAMPLE_ELLIPSIS: &str = "...";

static DIGIT_RUN: OnceLock<Regex> = OnceLock::new();

fn digit_run() -> &'static Regex {
    DIGIT_RUN.get_or_init(|| {
        Regex::new(&format!(r"\d{{{MIN_MASKED_DIGITS},}}")).expect("digit-run pattern is valid")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStructureFinding {
    /// True iff at least one keyword matched. Heuristic only.
    pub has_plausible_structure: bool,
    /// Matches in [`KEYWORDS`] order, not order of appearance.
    pub matched_keywords: Vec<String>,
    /// Input text with long digit runs replaced by [`MASK_TOKEN`].
    pub masked_text: String,
}

impl DocumentStructureFinding {
    /// Bounded prefix of the masked text for display.
    pub fn masked_sample(&self) -> String {
        masked_sample(&self.masked_text)
    }
}

/// Scan `text` for document vocabulary and mask digit runs.
pub fn validate(text: &str) -> DocumentStructureFinding {
    if text.is_empty() {
        return DocumentStructureFinding::default();
    }

    let haystack = text.to_lowercase();
    let matched_keywords: Vec<String> = KEYWORDS
        .iter()
        .filter(|kw| haystack.contains(&kw.to_lowercase()))
        .map(|kw| kw.to_string())
        .collect();

    tracing::debug!(matched = matched_keywords.len(), "document keywords scanned");

    DocumentStructureFinding {
        has_plausible_structure: !matched_keywords.is_empty(),
        matched_keywords,
        masked_text: mask_digit_runs(text),
    }
}

/// Replace every run of eight or more digits with [`MASK_TOKEN`].
///
/// Idempotent: the mask contains no digits, so re-masking is a no-op.
pub fn mask_digit_runs(text: &str) -> String {
    digit_run().replace_all(text, MASK_TOKEN).into_owned()
}

/// First [`SAMPLE_CHARS`] characters followed by `...`, or empty.
pub fn masked_sample(masked: &str) -> String {
    if masked.is_empty() {
        return String::new();
    }
    let mut sample: String = masked.chars().take(SAMPLE_CHARS).collect();
    sample.push_str(SAMPLE_ELLIPSIS);
    sample
}
