//! Core data model types for skillforge.
//!
//! These are the fundamental types the entire system uses to represent
//! answer events, grading results, daily rollups, and per-topic mastery.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Answer events
// ---------------------------------------------------------------------------

/// One student's response to one question.
///
/// An event is eligible for finalized aggregation iff `is_final` is set and
/// it has not been folded before (idempotency key = `id`). Drafts count
/// toward `attempted` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEvent {
    /// Unique event identifier; the aggregation idempotency key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Question answered.
    pub question_id: String,
    /// Question set the answer belongs to.
    #[serde(default)]
    pub set_id: String,
    /// Subject rollup key (e.g. "algebra").
    pub subject: String,
    /// Topic/skill tags; treated as a set, deduplicated at fold time.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Difficulty rating, 1..=5.
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    /// Question complexity score — the points awarded for a correct answer.
    #[serde(default)]
    pub qcs: u32,
    /// Correctness verdict; `None` until graded.
    #[serde(default)]
    pub is_correct: Option<bool>,
    /// Number of hints consumed.
    #[serde(default)]
    pub hint_uses: u32,
    /// Active answering time in milliseconds.
    #[serde(default)]
    pub time_taken_ms: u64,
    /// Whether the student finalized this submission.
    #[serde(default)]
    pub is_final: bool,
    /// Finalization timestamp; determines the aggregation day bucket.
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

fn default_difficulty() -> u8 {
    1
}

impl AnswerEvent {
    /// Topics with duplicates removed, first occurrence order preserved.
    pub fn distinct_topics(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for t in &self.topics {
            if !seen.contains(&t.as_str()) {
                seen.push(t.as_str());
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Grading results
// ---------------------------------------------------------------------------

/// Correctness classification for a graded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Correct,
    Partial,
    Incorrect,
}

impl fmt::Display for Correctness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correctness::Correct => write!(f, "correct"),
            Correctness::Partial => write!(f, "partial"),
            Correctness::Incorrect => write!(f, "incorrect"),
        }
    }
}

impl FromStr for Correctness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correct" => Ok(Correctness::Correct),
            "partial" => Ok(Correctness::Partial),
            "incorrect" => Ok(Correctness::Incorrect),
            other => Err(format!("unknown correctness: {other}")),
        }
    }
}

/// Score for a single rubric criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionScore {
    /// Criterion name.
    pub criterion: String,
    /// Points earned.
    pub score: u32,
    /// Points available.
    pub max_score: u32,
    /// Criterion-specific feedback, if any.
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Structured coaching feedback attached to a grading result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feedback {
    pub summary: String,
    #[serde(default)]
    pub what_was_right: Vec<String>,
    #[serde(default)]
    pub what_was_missing: Vec<String>,
    #[serde(default)]
    pub misconceptions: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Output of the grading orchestrator for one answer event.
///
/// Produced once per attempt and immutable thereafter; repeat study of the
/// same response may serve a cached copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    /// Identifier of the grading run that produced this result.
    pub run_id: Uuid,
    /// When grading completed.
    pub graded_at: DateTime<Utc>,
    /// Points earned, in `[0..max_score]`.
    pub score: u32,
    /// Points available; always at least 1.
    pub max_score: u32,
    /// `round(100 * score / max_score)`.
    pub percentage: u32,
    pub correctness: Correctness,
    /// Ordered per-criterion scores.
    pub rubric_scores: Vec<CriterionScore>,
    pub feedback: Feedback,
    /// Internal grader confidence in `[0, 1]`; drives escalation.
    pub confidence: f64,
    /// Whether an escalation pass produced this result.
    pub escalated: bool,
    /// Set under manual escalation when the result lands in the partial band.
    pub escalation_eligible: bool,
}

// ---------------------------------------------------------------------------
// Questions and rubrics
// ---------------------------------------------------------------------------

/// A scoring guide with weighted criteria for free-text responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub criteria: Vec<RubricCriterion>,
    /// How confident the rubric's author (human or model) is in it, `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Rubric {
    /// Total points available across all criteria.
    pub fn max_score(&self) -> u32 {
        self.criteria.iter().map(|c| c.max_score).sum()
    }
}

/// One weighted criterion of a rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub name: String,
    pub max_score: u32,
    /// Guidance for the grader on what earns the points.
    #[serde(default)]
    pub guidance: String,
}

/// How a question expects to be graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnswerKey {
    /// Accepted literal answers; graded locally by normalized comparison.
    Exact { accept: Vec<String> },
    /// Authored rubric; scored per criterion by the grading backend.
    Rubric { rubric: Rubric },
    /// Reference answer only; the backend constructs a rubric on the fly.
    Reference { answer: String },
}

impl AnswerKey {
    /// True for exact-match item types (correct threshold 100).
    pub fn is_exact(&self) -> bool {
        matches!(self, AnswerKey::Exact { .. })
    }
}

/// A resolved reference item from the question store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub stem: String,
    pub answer_key: AnswerKey,
    pub subject: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub qcs: u32,
}

// ---------------------------------------------------------------------------
// Daily aggregates
// ---------------------------------------------------------------------------

/// Per-subject or per-topic counter triple inside a daily aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub attempted: u64,
    pub correct: u64,
    pub time_total_ms: u64,
}

impl CategoryStats {
    fn add(&mut self, other: &CategoryStats) {
        self.attempted += other.attempted;
        self.correct += other.correct;
        self.time_total_ms += other.time_total_ms;
    }
}

/// One user's rollup for one calendar day. Merged, never replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub points: u64,
    pub attempted: u64,
    pub finalized: u64,
    pub correct: u64,
    pub incorrect: u64,
    pub hint_count: u64,
    pub time_total_ms: u64,
    #[serde(default)]
    pub subjects: HashMap<String, CategoryStats>,
    #[serde(default)]
    pub topics: HashMap<String, CategoryStats>,
}

impl DailyAggregate {
    /// Merge one fold's increments into this aggregate.
    ///
    /// Every field is a plain addition, so applications commute and
    /// associate: concurrent folds for the same user/day cannot lose an
    /// update regardless of arrival order.
    pub fn apply(&mut self, delta: &DailyDelta) {
        self.points += delta.points;
        self.attempted += delta.attempted;
        self.finalized += delta.finalized;
        self.correct += delta.correct;
        self.incorrect += delta.incorrect;
        self.hint_count += delta.hint_count;
        self.time_total_ms += delta.time_total_ms;
        for (subject, stats) in &delta.subjects {
            self.subjects.entry(subject.clone()).or_default().add(stats);
        }
        for (topic, stats) in &delta.topics {
            self.topics.entry(topic.clone()).or_default().add(stats);
        }
    }
}

/// The commutative increment bundle one fold applies to a daily aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyDelta {
    pub points: u64,
    pub attempted: u64,
    pub finalized: u64,
    pub correct: u64,
    pub incorrect: u64,
    pub hint_count: u64,
    pub time_total_ms: u64,
    #[serde(default)]
    pub subjects: HashMap<String, CategoryStats>,
    #[serde(default)]
    pub topics: HashMap<String, CategoryStats>,
}

impl DailyDelta {
    /// Increments for a draft (non-final) event: attempted counts only.
    pub fn draft(event: &AnswerEvent) -> Self {
        let attempted_only = CategoryStats {
            attempted: 1,
            correct: 0,
            time_total_ms: 0,
        };
        let mut delta = DailyDelta {
            attempted: 1,
            ..Default::default()
        };
        delta
            .subjects
            .insert(event.subject.clone(), attempted_only.clone());
        for topic in event.distinct_topics() {
            delta.topics.insert(topic.to_string(), attempted_only.clone());
        }
        delta
    }

    /// Increments for a finalized event.
    pub fn finalized(event: &AnswerEvent, is_correct: bool) -> Self {
        let triple = CategoryStats {
            attempted: 1,
            correct: is_correct as u64,
            time_total_ms: event.time_taken_ms,
        };
        let mut delta = DailyDelta {
            points: if is_correct { event.qcs as u64 } else { 0 },
            attempted: 1,
            finalized: 1,
            correct: is_correct as u64,
            incorrect: (!is_correct) as u64,
            hint_count: event.hint_uses as u64,
            time_total_ms: event.time_taken_ms,
            ..Default::default()
        };
        delta.subjects.insert(event.subject.clone(), triple.clone());
        for topic in event.distinct_topics() {
            delta.topics.insert(topic.to_string(), triple.clone());
        }
        delta
    }
}

// ---------------------------------------------------------------------------
// Topic mastery
// ---------------------------------------------------------------------------

/// Discrete mastery band, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Novice,
    Developing,
    Proficient,
    Mastered,
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasteryLevel::Novice => write!(f, "novice"),
            MasteryLevel::Developing => write!(f, "developing"),
            MasteryLevel::Proficient => write!(f, "proficient"),
            MasteryLevel::Mastered => write!(f, "mastered"),
        }
    }
}

impl FromStr for MasteryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "novice" => Ok(MasteryLevel::Novice),
            "developing" => Ok(MasteryLevel::Developing),
            "proficient" => Ok(MasteryLevel::Proficient),
            "mastered" => Ok(MasteryLevel::Mastered),
            other => Err(format!("unknown mastery level: {other}")),
        }
    }
}

/// One user's mastery state for one topic.
///
/// `mastery` and `level` are derived from `(attempts, correct)` on every
/// update; they are never mutated independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMastery {
    pub topic_id: String,
    /// Confidence-weighted mastery score in `[0, 100]`.
    pub mastery: f64,
    pub level: MasteryLevel,
    pub attempts: u64,
    pub correct: u64,
    pub last_activity: DateTime<Utc>,
    /// Signed delta vs. the snapshot from 7+ days ago; 0 without history.
    pub trend_7d: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(topics: &[&str]) -> AnswerEvent {
        AnswerEvent {
            id: "evt-1".into(),
            user_id: "u1".into(),
            question_id: "q1".into(),
            set_id: "s1".into(),
            subject: "algebra".into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            difficulty: 2,
            qcs: 5,
            is_correct: Some(true),
            hint_uses: 1,
            time_taken_ms: 30_000,
            is_final: true,
            finalized_at: Some(Utc::now()),
        }
    }

    #[test]
    fn correctness_display_and_parse() {
        assert_eq!(Correctness::Correct.to_string(), "correct");
        assert_eq!("Partial".parse::<Correctness>().unwrap(), Correctness::Partial);
        assert!("wrong".parse::<Correctness>().is_err());
    }

    #[test]
    fn mastery_level_display_and_parse() {
        assert_eq!(MasteryLevel::Proficient.to_string(), "proficient");
        assert_eq!("mastered".parse::<MasteryLevel>().unwrap(), MasteryLevel::Mastered);
        assert!("guru".parse::<MasteryLevel>().is_err());
    }

    #[test]
    fn answer_event_defaults_absent_optional_fields() {
        let json = r#"{"id":"e1","user_id":"u1","question_id":"q1","subject":"algebra"}"#;
        let event: AnswerEvent = serde_json::from_str(json).unwrap();
        assert!(event.topics.is_empty());
        assert_eq!(event.hint_uses, 0);
        assert_eq!(event.is_correct, None);
        assert!(!event.is_final);
        assert!(event.finalized_at.is_none());
    }

    #[test]
    fn distinct_topics_preserves_order() {
        let event = event(&["fractions", "ratios", "fractions"]);
        assert_eq!(event.distinct_topics(), vec!["fractions", "ratios"]);
    }

    #[test]
    fn finalized_delta_counts_everything() {
        let delta = DailyDelta::finalized(&event(&["fractions"]), true);
        assert_eq!(delta.attempted, 1);
        assert_eq!(delta.finalized, 1);
        assert_eq!(delta.correct, 1);
        assert_eq!(delta.incorrect, 0);
        assert_eq!(delta.points, 5);
        assert_eq!(delta.hint_count, 1);
        assert_eq!(delta.time_total_ms, 30_000);
        assert_eq!(delta.subjects["algebra"].correct, 1);
        assert_eq!(delta.topics["fractions"].time_total_ms, 30_000);
    }

    #[test]
    fn draft_delta_counts_attempted_only() {
        let delta = DailyDelta::draft(&event(&["fractions"]));
        assert_eq!(delta.attempted, 1);
        assert_eq!(delta.finalized, 0);
        assert_eq!(delta.correct, 0);
        assert_eq!(delta.points, 0);
        assert_eq!(delta.time_total_ms, 0);
        assert_eq!(delta.subjects["algebra"].attempted, 1);
        assert_eq!(delta.subjects["algebra"].correct, 0);
    }

    #[test]
    fn apply_is_commutative() {
        let a = DailyDelta::finalized(&event(&["fractions"]), true);
        let b = DailyDelta::finalized(&event(&["ratios"]), false);

        let mut forward = DailyAggregate::default();
        forward.apply(&a);
        forward.apply(&b);

        let mut backward = DailyAggregate::default();
        backward.apply(&b);
        backward.apply(&a);

        assert_eq!(forward, backward);
        assert_eq!(forward.attempted, 2);
        assert_eq!(forward.correct, 1);
        assert_eq!(forward.incorrect, 1);
    }

    #[test]
    fn zero_qcs_contributes_zero_points_even_when_correct() {
        let mut e = event(&[]);
        e.qcs = 0;
        let delta = DailyDelta::finalized(&e, true);
        assert_eq!(delta.points, 0);
        assert_eq!(delta.correct, 1);
    }

    #[test]
    fn grading_result_serde_roundtrip() {
        let result = GradingResult {
            run_id: Uuid::nil(),
            graded_at: Utc::now(),
            score: 7,
            max_score: 10,
            percentage: 70,
            correctness: Correctness::Partial,
            rubric_scores: vec![CriterionScore {
                criterion: "reasoning".into(),
                score: 7,
                max_score: 10,
                feedback: None,
            }],
            feedback: Feedback {
                summary: "solid start".into(),
                ..Default::default()
            },
            confidence: 0.8,
            escalated: false,
            escalation_eligible: true,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: GradingResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.percentage, 70);
        assert_eq!(back.correctness, Correctness::Partial);
        assert_eq!(back.rubric_scores.len(), 1);
    }
}
