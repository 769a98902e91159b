//! Mastery scoring: confidence-weighted accuracy with time decay.
//!
//! The 70/30 weighting is a core invariant: a single lucky answer yields
//! 73.0, not 100 — mastery is earned through repetition. Band cut points and
//! decay parameters are configuration (`config::MasteryConfig`).

use chrono::{DateTime, Utc};

use crate::config::{DecayConfig, MasteryBand};
use crate::model::{MasteryLevel, TopicMastery};
use crate::traits::MasterySnapshot;

/// Weight of raw accuracy in the mastery score.
pub const ACCURACY_WEIGHT: f64 = 70.0;
/// Weight of the attempt-count confidence term.
pub const CONFIDENCE_WEIGHT: f64 = 30.0;
/// Attempts at which the confidence term saturates.
pub const CONFIDENCE_SATURATION: f64 = 10.0;

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Recompute the mastery score from accumulated counters.
///
/// `accuracy * 70 + min(attempts / 10, 1) * 30`, rounded to one decimal.
/// Zero attempts yield 0.0; ten-for-ten yields exactly 100.0.
pub fn recompute(attempts: u64, correct: u64) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    let accuracy = correct as f64 / attempts as f64;
    let confidence = (attempts as f64 / CONFIDENCE_SATURATION).min(1.0);
    round1(accuracy * ACCURACY_WEIGHT + confidence * CONFIDENCE_WEIGHT)
}

/// Map a mastery score to its band.
///
/// Bands are an ordered list of inclusive lower bounds (validated at config
/// load); the last band whose bound the score reaches applies.
pub fn level_for(mastery: f64, bands: &[MasteryBand]) -> MasteryLevel {
    bands
        .iter()
        .rev()
        .find(|band| mastery >= band.lower)
        .map(|band| band.level)
        .unwrap_or(MasteryLevel::Novice)
}

/// Signed 7-day trend: current score minus the snapshot from 7+ days ago,
/// or 0.0 when no such snapshot exists ("no signal yet", not null).
pub fn trend_7d(current: f64, prior: Option<&MasterySnapshot>) -> f64 {
    prior.map(|s| round1(current - s.mastery)).unwrap_or(0.0)
}

/// Apply inactivity decay to a mastery score.
///
/// Recomputed from `last_activity` elapsed time on every call, so repeated
/// application without new activity is idempotent. Never increases a score:
/// a value already below the floor is left where it is.
pub fn decayed_mastery(
    base: f64,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &DecayConfig,
) -> f64 {
    let idle_days = (now - last_activity).num_days();
    let overdue_days = idle_days - config.inactivity_days as i64;
    if overdue_days <= 0 {
        return base;
    }
    let floor = config.floor.min(base);
    round1((base - config.points_per_day * overdue_days as f64).max(floor))
}

/// The standalone decay pass over one mastery document.
///
/// Derives the undecayed score from the stored counters and subtracts the
/// elapsed decay, so the pass can run any number of times between activity
/// without compounding.
pub fn decay_pass(
    current: &TopicMastery,
    bands: &[MasteryBand],
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> TopicMastery {
    let base = recompute(current.attempts, current.correct);
    let mastery = decayed_mastery(base, current.last_activity, now, config);
    TopicMastery {
        mastery,
        level: level_for(mastery, bands),
        ..current.clone()
    }
}
