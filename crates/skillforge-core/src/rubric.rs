//! Rubric scoring primitives.
//!
//! Pure functions: answer normalization, exact-match grading, rubric
//! summation, correctness classification, and the content safety pre-check.

use crate::config::GradingConfig;
use crate::error::EngineError;
use crate::model::{Correctness, CriterionScore, Rubric};

/// Responses longer than this are rejected as unsafe payloads.
const MAX_RESPONSE_CHARS: usize = 50_000;

/// Markers that fail the safety pre-check regardless of context.
const UNSAFE_MARKERS: &[&str] = &["<script", "javascript:"];

/// Normalize a free-text answer for exact-match comparison: trim, lowercase,
/// collapse internal whitespace.
pub fn normalize_answer(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Grade an exact-match item. Returns `(score, max_score)` where a match
/// earns the full complexity score and a miss earns zero.
pub fn grade_exact(accept: &[String], response: &str, qcs: u32) -> (u32, u32) {
    let max_score = qcs.max(1);
    let normalized = normalize_answer(response);
    let matched = accept.iter().any(|a| normalize_answer(a) == normalized);
    (if matched { max_score } else { 0 }, max_score)
}

/// Sum criterion scores into `(score, max_score)`.
pub fn sum_rubric(scores: &[CriterionScore]) -> (u32, u32) {
    let score = scores.iter().map(|c| c.score.min(c.max_score)).sum();
    let max_score = scores.iter().map(|c| c.max_score).sum();
    (score, max_score)
}

/// `round(100 * score / max_score)`, clamped to `[0, 100]`.
pub fn percentage(score: u32, max_score: u32) -> u32 {
    if max_score == 0 {
        return 0;
    }
    let pct = (100.0 * score as f64 / max_score as f64).round() as u32;
    pct.min(100)
}

/// Classify a percentage into a correctness band.
pub fn classify(pct: u32, exact_item: bool, config: &GradingConfig) -> Correctness {
    let correct_threshold = if exact_item {
        config.correct_threshold_exact
    } else {
        config.correct_threshold_rubric
    };
    if pct >= correct_threshold {
        Correctness::Correct
    } else if pct < config.incorrect_below {
        Correctness::Incorrect
    } else {
        Correctness::Partial
    }
}

/// Safety pre-check for a student response.
///
/// Only genuinely unsafe content is rejected: embedded control characters,
/// script-injection markers, or an oversized payload. An empty or trivially
/// short answer is valid input and is graded (as zero), never rejected.
pub fn precheck_response(response: &str) -> Result<(), EngineError> {
    if response.chars().count() > MAX_RESPONSE_CHARS {
        return Err(EngineError::ContentRejected(format!(
            "response exceeds {MAX_RESPONSE_CHARS} characters"
        )));
    }
    if response
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(EngineError::ContentRejected(
            "response contains control characters".into(),
        ));
    }
    let lowered = response.to_lowercase();
    for marker in UNSAFE_MARKERS {
        if lowered.contains(marker) {
            return Err(EngineError::ContentRejected(format!(
                "response contains disallowed marker {marker:?}"
            )));
        }
    }
    Ok(())
}

/// Whether a rubric's confidence falls below the caching threshold.
pub fn is_weak(rubric: &Rubric, config: &GradingConfig) -> bool {
    rubric.confidence < config.weak_rubric_confidence
}
