//! Collaborator trait definitions.
//!
//! These seams isolate the engine from question storage, the grading
//! backend, the document store, and the auth/rate-limit collaborators.
//! Implementations live in the `skillforge-backends` and `skillforge-store`
//! crates (and in embedding applications).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{
    CriterionScore, DailyAggregate, DailyDelta, Feedback, Question, Rubric, TopicMastery,
};

// ---------------------------------------------------------------------------
// Question store
// ---------------------------------------------------------------------------

/// Read access to reference items (stem + answer key).
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Resolve a question by id, or `NotFound`.
    async fn resolve_question(&self, question_id: &str) -> Result<Question, EngineError>;
}

// ---------------------------------------------------------------------------
// Grading backend
// ---------------------------------------------------------------------------

/// Grading strategy requested from the backend.
///
/// `Strict` uses more context and tighter criteria; the orchestrator invokes
/// it on escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingStrategy {
    Standard,
    Strict,
}

/// A single assessment request sent to the grading backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessRequest {
    pub question_id: String,
    /// Question stem shown to the student.
    pub stem: String,
    /// Reference answer text, when the item carries no authored rubric.
    #[serde(default)]
    pub reference_answer: Option<String>,
    /// Rubric to score against: authored, or cached from a prior call.
    #[serde(default)]
    pub rubric: Option<Rubric>,
    pub student_response: String,
    pub strategy: GradingStrategy,
}

/// The backend's verdict for one assessment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessResponse {
    /// Ordered per-criterion scores.
    pub rubric_scores: Vec<CriterionScore>,
    /// The rubric that was scored against (authored, cached, or constructed).
    pub rubric: Rubric,
    /// Grader confidence in `[0, 1]`.
    pub confidence: f64,
    pub feedback: Feedback,
}

/// Trait for grading backends that score free-text responses.
///
/// Errors are `BackendError` values surfaced through `anyhow` so the
/// orchestrator can downcast and classify them.
#[async_trait]
pub trait GradingBackend: Send + Sync {
    /// Human-readable backend name (e.g. "remote").
    fn name(&self) -> &str;

    /// Score one student response.
    async fn assess(&self, request: &AssessRequest) -> anyhow::Result<AssessResponse>;
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// Per-topic attempt counters, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCounters {
    pub attempts: u64,
    pub correct: u64,
    pub last_activity: DateTime<Utc>,
}

/// A day-keyed mastery observation used for trend computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterySnapshot {
    /// ISO calendar date (`%Y-%m-%d`).
    pub day: String,
    pub mastery: f64,
}

/// Cache of constructed rubrics keyed by question id.
///
/// Persisting a low-confidence rubric amortizes its construction cost across
/// students answering the same question.
#[async_trait]
pub trait RubricCache: Send + Sync {
    async fn cached_rubric(&self, question_id: &str) -> anyhow::Result<Option<Rubric>>;

    /// Idempotent upsert.
    async fn put_cached_rubric(&self, question_id: &str, rubric: &Rubric) -> anyhow::Result<()>;
}

/// Document store for aggregates and mastery.
///
/// All mutations are atomic increments or whole-delta merges; the one
/// compare-and-set is the aggregation idempotency mark. Implementations must
/// apply each call entirely or not at all.
#[async_trait]
pub trait AggregateStore: RubricCache {
    /// Atomically merge one delta into the `(uid, day)` aggregate.
    async fn increment_daily(&self, uid: &str, day: &str, delta: &DailyDelta)
        -> anyhow::Result<()>;

    /// Atomically bump topic counters and advance `last_activity` to
    /// `max(existing, at)`. Returns the post-increment counters.
    async fn increment_topic(
        &self,
        uid: &str,
        topic: &str,
        attempts: u64,
        correct: u64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<TopicCounters>;

    /// Compare-and-set the idempotency mark for an event id. Returns `true`
    /// if this call set the mark (the event has not been folded before).
    async fn try_mark_aggregated(&self, event_id: &str) -> anyhow::Result<bool>;

    async fn daily_aggregate(&self, uid: &str, day: &str)
        -> anyhow::Result<Option<DailyAggregate>>;

    async fn put_topic_mastery(&self, uid: &str, mastery: &TopicMastery) -> anyhow::Result<()>;

    async fn topic_mastery(&self, uid: &str, topic: &str)
        -> anyhow::Result<Option<TopicMastery>>;

    /// All mastery documents for a user, ordered by topic id.
    async fn all_topic_mastery(&self, uid: &str) -> anyhow::Result<Vec<TopicMastery>>;

    /// Record a day-keyed mastery observation (last write for a day wins).
    async fn record_mastery_snapshot(
        &self,
        uid: &str,
        topic: &str,
        day: &str,
        mastery: f64,
    ) -> anyhow::Result<()>;

    /// Most recent snapshot at or before `day`, if any.
    async fn mastery_snapshot_at_or_before(
        &self,
        uid: &str,
        topic: &str,
        day: &str,
    ) -> anyhow::Result<Option<MasterySnapshot>>;
}

// ---------------------------------------------------------------------------
// Auth and rate limiting collaborators
// ---------------------------------------------------------------------------

/// An unauthenticated caller identity, as received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub token: String,
}

/// Roles recognized by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// Role claims attached to an authenticated user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Authentication and role assertion, delegated to the platform.
pub trait Authenticator: Send + Sync {
    /// Verify the principal and return the user id.
    fn assert_authenticated(&self, principal: &Principal) -> Result<String, EngineError>;

    /// Verify the user holds the required role.
    fn assert_role(&self, uid: &str, claims: &Claims, required: Role) -> Result<(), EngineError>;
}

/// Rate limiting, delegated to the platform.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Allow the action or fail with `ResourceExhausted`.
    async fn enforce(
        &self,
        uid: &str,
        action_key: &str,
        max: u32,
        window_secs: u64,
    ) -> Result<(), EngineError>;
}
