//! Wire types for the service surface.

use serde::{Deserialize, Serialize};

use skillforge_core::config::GradingConfig;
use skillforge_core::error::EngineError;
use skillforge_core::model::{AnswerEvent, Correctness, CriterionScore, Feedback, GradingResult};
use skillforge_core::orchestrator::{EscalationMode, GradeOptions};

/// Body of a grading request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeApiRequest {
    pub attempt_id: String,
    pub question_id: String,
    /// Absent (not merely empty) means the field was missing.
    #[serde(default)]
    pub student_answer: Option<String>,
    #[serde(default)]
    pub options: Option<GradeOptionsBody>,
}

/// Caller-supplied grading options; absent fields take configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeOptionsBody {
    #[serde(default)]
    pub persist_weak_rubric: Option<bool>,
    #[serde(default)]
    pub escalation: Option<EscalationMode>,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
}

impl GradeApiRequest {
    /// Resolve the caller's options against configured defaults.
    pub fn resolved_options(&self, config: &GradingConfig) -> GradeOptions {
        let body = self.options.clone().unwrap_or_default();
        GradeOptions {
            persist_weak_rubric: body.persist_weak_rubric.unwrap_or(false),
            escalation: body.escalation.unwrap_or(EscalationMode::Auto),
            max_latency_ms: body.max_latency_ms.unwrap_or(config.default_max_latency_ms),
        }
    }
}

/// Overall score summary in a grading response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallScore {
    pub pct: u32,
    pub correctness: Correctness,
}

/// Body of a grading response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeApiResponse {
    pub overall: OverallScore,
    pub rubric: Vec<CriterionScore>,
    pub feedback: Feedback,
}

impl From<GradingResult> for GradeApiResponse {
    fn from(result: GradingResult) -> Self {
        Self {
            overall: OverallScore {
                pct: result.percentage,
                correctness: result.correctness,
            },
            rubric: result.rubric_scores,
            feedback: result.feedback,
        }
    }
}

/// Structured wire error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<EngineError> for ErrorBody {
    fn from(err: EngineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Fixed liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Before/after state of one answer event record, as delivered by the
/// storage trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEventChange {
    #[serde(default)]
    pub before: Option<AnswerEvent>,
    pub after: AnswerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_options_takes_defaults() {
        let json = r#"{"attempt_id":"a1","question_id":"q1","student_answer":"x"}"#;
        let request: GradeApiRequest = serde_json::from_str(json).unwrap();
        let options = request.resolved_options(&GradingConfig::default());
        assert!(!options.persist_weak_rubric);
        assert_eq!(options.escalation, EscalationMode::Auto);
        assert_eq!(options.max_latency_ms, 8_000);
    }

    #[test]
    fn request_options_override_defaults() {
        let json = r#"{
            "attempt_id": "a1",
            "question_id": "q1",
            "student_answer": "x",
            "options": {"escalation": "none", "max_latency_ms": 2500}
        }"#;
        let request: GradeApiRequest = serde_json::from_str(json).unwrap();
        let options = request.resolved_options(&GradingConfig::default());
        assert_eq!(options.escalation, EscalationMode::None);
        assert_eq!(options.max_latency_ms, 2_500);
    }

    #[test]
    fn missing_student_answer_deserializes_as_none() {
        let json = r#"{"attempt_id":"a1","question_id":"q1"}"#;
        let request: GradeApiRequest = serde_json::from_str(json).unwrap();
        assert!(request.student_answer.is_none());
    }

    #[test]
    fn error_body_carries_stable_code() {
        let body = ErrorBody::from(EngineError::Timeout { budget_ms: 500 });
        assert_eq!(body.code, "timeout");
        assert!(body.message.contains("500ms"));
    }

    #[test]
    fn health_payload_is_fixed() {
        let health = HealthStatus::ok();
        let json = serde_json::to_string(&health).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }

    #[test]
    fn change_without_before_state() {
        let json = r#"{"after":{"id":"e1","user_id":"u1","question_id":"q1","subject":"math"}}"#;
        let change: AnswerEventChange = serde_json::from_str(json).unwrap();
        assert!(change.before.is_none());
        assert_eq!(change.after.id, "e1");
    }
}
