//! Engine configuration.
//!
//! Thresholds, mastery bands, and decay parameters are configuration, not
//! invariants; the mastery formula weights themselves are fixed (see
//! `mastery`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::MasteryLevel;

/// Grading thresholds and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Percentage at or above which an exact-match item counts as correct.
    #[serde(default = "default_threshold_exact")]
    pub correct_threshold_exact: u32,
    /// Percentage at or above which a rubric item counts as correct.
    #[serde(default = "default_threshold_rubric")]
    pub correct_threshold_rubric: u32,
    /// Percentage below which any item counts as incorrect.
    #[serde(default = "default_incorrect_below")]
    pub incorrect_below: u32,
    /// Default wall-clock budget for a grading call.
    #[serde(default = "default_max_latency_ms")]
    pub default_max_latency_ms: u64,
    /// Minimum remaining budget for an escalation pass to run.
    #[serde(default = "default_escalation_floor_ms")]
    pub escalation_floor_ms: u64,
    /// Rubrics below this confidence are cacheable as "weak".
    #[serde(default = "default_weak_rubric_confidence")]
    pub weak_rubric_confidence: f64,
}

fn default_threshold_exact() -> u32 {
    100
}
fn default_threshold_rubric() -> u32 {
    80
}
fn default_incorrect_below() -> u32 {
    50
}
fn default_max_latency_ms() -> u64 {
    8_000
}
fn default_escalation_floor_ms() -> u64 {
    250
}
fn default_weak_rubric_confidence() -> f64 {
    0.6
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            correct_threshold_exact: default_threshold_exact(),
            correct_threshold_rubric: default_threshold_rubric(),
            incorrect_below: default_incorrect_below(),
            default_max_latency_ms: default_max_latency_ms(),
            escalation_floor_ms: default_escalation_floor_ms(),
            weak_rubric_confidence: default_weak_rubric_confidence(),
        }
    }
}

/// One mastery band: the level applies from `lower` up to the next band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MasteryBand {
    pub level: MasteryLevel,
    /// Inclusive lower bound of the band.
    pub lower: f64,
}

/// Inactivity decay parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Days of inactivity before decay starts.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,
    /// Mastery points lost per day past the window.
    #[serde(default = "default_points_per_day")]
    pub points_per_day: f64,
    /// Decay never reduces mastery below this floor.
    #[serde(default = "default_floor")]
    pub floor: f64,
}

fn default_inactivity_days() -> u32 {
    14
}
fn default_points_per_day() -> f64 {
    1.0
}
fn default_floor() -> f64 {
    25.0
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            inactivity_days: default_inactivity_days(),
            points_per_day: default_points_per_day(),
            floor: default_floor(),
        }
    }
}

/// Mastery banding and decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryConfig {
    /// Ordered lower bounds partitioning `[0, 100]`; validated at load.
    #[serde(default = "default_bands")]
    pub bands: Vec<MasteryBand>,
    #[serde(default)]
    pub decay: DecayConfig,
}

fn default_bands() -> Vec<MasteryBand> {
    vec![
        MasteryBand {
            level: MasteryLevel::Novice,
            lower: 0.0,
        },
        MasteryBand {
            level: MasteryLevel::Developing,
            lower: 40.0,
        },
        MasteryBand {
            level: MasteryLevel::Proficient,
            lower: 70.0,
        },
        MasteryBand {
            level: MasteryLevel::Mastered,
            lower: 90.0,
        },
    ]
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            decay: DecayConfig::default(),
        }
    }
}

/// Rate limits applied at the service edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Grading calls allowed per user per window.
    #[serde(default = "default_grade_max")]
    pub grade_max_per_window: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_grade_max() -> u32 {
    30
}
fn default_window_secs() -> u64 {
    60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            grade_max_per_window: default_grade_max(),
            window_secs: default_window_secs(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub mastery: MasteryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mastery bands must not be empty")]
    EmptyBands,

    #[error("first mastery band must start at 0, got {0}")]
    FirstBandNotZero(f64),

    #[error("mastery band bounds must be strictly ascending: {0} then {1}")]
    BandsNotAscending(f64, f64),

    #[error("mastery band bound {0} outside [0, 100]")]
    BandOutOfRange(f64),
}

impl EngineConfig {
    /// Validate band layout: bands must start at 0, ascend strictly, and
    /// stay within `[0, 100]`, so they partition the range with no gaps or
    /// overlaps by construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bands = &self.mastery.bands;
        let Some(first) = bands.first() else {
            return Err(ConfigError::EmptyBands);
        };
        if first.lower != 0.0 {
            return Err(ConfigError::FirstBandNotZero(first.lower));
        }
        for pair in bands.windows(2) {
            if pair[1].lower <= pair[0].lower {
                return Err(ConfigError::BandsNotAscending(pair[0].lower, pair[1].lower));
            }
        }
        for band in bands {
            if !(0.0..=100.0).contains(&band.lower) {
                return Err(ConfigError::BandOutOfRange(band.lower));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grading.correct_threshold_exact, 100);
        assert_eq!(config.grading.correct_threshold_rubric, 80);
        assert_eq!(config.grading.incorrect_below, 50);
        assert_eq!(config.mastery.bands.len(), 4);
        assert_eq!(config.mastery.decay.inactivity_days, 14);
    }

    #[test]
    fn bands_must_start_at_zero() {
        let mut config = EngineConfig::default();
        config.mastery.bands[0].lower = 5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FirstBandNotZero(_))
        ));
    }

    #[test]
    fn bands_must_ascend() {
        let mut config = EngineConfig::default();
        config.mastery.bands[2].lower = 10.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BandsNotAscending(_, _))
        ));
    }

    #[test]
    fn bands_must_stay_in_range() {
        let mut config = EngineConfig::default();
        config.mastery.bands[3].lower = 120.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BandOutOfRange(_))
        ));
    }

    #[test]
    fn parse_from_toml_with_partial_overrides() {
        let toml_str = r#"
[grading]
correct_threshold_rubric = 85
default_max_latency_ms = 5000

[mastery.decay]
inactivity_days = 21
floor = 30.0
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.grading.correct_threshold_rubric, 85);
        assert_eq!(config.grading.correct_threshold_exact, 100);
        assert_eq!(config.mastery.decay.inactivity_days, 21);
        assert_eq!(config.mastery.decay.floor, 30.0);
        assert_eq!(config.limits.grade_max_per_window, 30);
    }
}
