//! Grading orchestration.
//!
//! Owns the request/response contract for one grading call: validation, the
//! wall-clock latency budget, escalation policy, and assembly of the final
//! `GradingResult`. The orchestrator never retries on its own — retrying a
//! possibly-expensive grading call is caller policy — and never mutates
//! events or aggregates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GradingConfig;
use crate::error::{BackendError, EngineError};
use crate::model::{AnswerKey, Correctness, CriterionScore, Feedback, GradingResult, Question};
use crate::rubric;
use crate::traits::{
    AssessRequest, AssessResponse, GradingBackend, GradingStrategy, QuestionStore, RubricCache,
};

/// Escalation policy for a grading call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    /// Re-grade ambiguous (partial) results once with the strict strategy.
    Auto,
    /// Only mark ambiguous results as escalation-eligible for a
    /// caller-triggered re-grade.
    Manual,
    /// Never escalate.
    None,
}

/// Recognized grading options; a closed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeOptions {
    /// Cache a low-confidence rubric for reuse across students.
    #[serde(default)]
    pub persist_weak_rubric: bool,
    #[serde(default = "default_escalation")]
    pub escalation: EscalationMode,
    /// Wall-clock budget for the whole grading call.
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
}

fn default_escalation() -> EscalationMode {
    EscalationMode::Auto
}

fn default_max_latency_ms() -> u64 {
    8_000
}

impl Default for GradeOptions {
    fn default() -> Self {
        Self {
            persist_weak_rubric: false,
            escalation: default_escalation(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

/// One grading request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeCommand {
    pub attempt_id: String,
    pub question_id: String,
    /// `None` means the field was missing, which is invalid; an empty string
    /// is a valid (zero-scoring) response.
    pub student_answer: Option<String>,
    #[serde(default)]
    pub options: GradeOptions,
}

/// Coordinates validation, the grading backend, and escalation for one call.
pub struct GradingOrchestrator {
    questions: Arc<dyn QuestionStore>,
    backend: Arc<dyn GradingBackend>,
    cache: Arc<dyn RubricCache>,
    config: GradingConfig,
}

impl GradingOrchestrator {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        backend: Arc<dyn GradingBackend>,
        cache: Arc<dyn RubricCache>,
        config: GradingConfig,
    ) -> Self {
        Self {
            questions,
            backend,
            cache,
            config,
        }
    }

    /// Grade one student response.
    ///
    /// Returns within `options.max_latency_ms` plus a small fixed overhead,
    /// or fails with `Timeout`. Backend failures propagate verbatim — a
    /// failed grade is never reported as a zero score.
    pub async fn grade(&self, cmd: &GradeCommand) -> Result<GradingResult, EngineError> {
        let start = Instant::now();

        // Received -> Validated
        if cmd.attempt_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument("attempt_id is required".into()));
        }
        if cmd.question_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument("question_id is required".into()));
        }
        let Some(answer) = cmd.student_answer.as_deref() else {
            return Err(EngineError::InvalidArgument(
                "student_answer is required".into(),
            ));
        };
        rubric::precheck_response(answer)?;

        let question = self.questions.resolve_question(&cmd.question_id).await?;
        tracing::debug!(
            attempt_id = %cmd.attempt_id,
            question_id = %question.id,
            "grading request validated"
        );

        // Exact-match items grade locally and deterministically.
        if let AnswerKey::Exact { accept } = &question.answer_key {
            let result = grade_exact_item(accept, answer, &question, &self.config);
            tracing::debug!(attempt_id = %cmd.attempt_id, pct = result.percentage, "exact item delivered");
            return Ok(result);
        }

        let budget_ms = cmd.options.max_latency_ms;
        let budget = Duration::from_millis(budget_ms);

        // A cached rubric makes repeat grading of the same question
        // deterministic; cache read failures must not fail the call.
        let cached = match self.cache.cached_rubric(&question.id).await {
            Ok(rubric) => rubric,
            Err(e) => {
                tracing::warn!(question_id = %question.id, error = %e, "rubric cache read failed");
                None
            }
        };

        let authored = match &question.answer_key {
            AnswerKey::Rubric { rubric } => Some(rubric.clone()),
            _ => None,
        };
        let reference_answer = match &question.answer_key {
            AnswerKey::Reference { answer } => Some(answer.clone()),
            _ => None,
        };

        let mut request = AssessRequest {
            question_id: question.id.clone(),
            stem: question.stem.clone(),
            reference_answer,
            rubric: authored.or(cached),
            student_response: answer.to_string(),
            strategy: GradingStrategy::Standard,
        };

        // Validated -> Graded
        let remaining = budget.saturating_sub(start.elapsed());
        let first = self.assess_within(&request, remaining, budget_ms).await?;
        let mut used_rubric = first.rubric.clone();
        let mut result = self.build_result(first, false);

        match cmd.options.escalation {
            EscalationMode::Auto if result.correctness == Correctness::Partial => {
                let remaining = budget.saturating_sub(start.elapsed());
                if remaining >= Duration::from_millis(self.config.escalation_floor_ms) {
                    // Graded -> Escalated -> Graded
                    request.strategy = GradingStrategy::Strict;
                    match self.assess_within(&request, remaining, budget_ms).await {
                        Ok(second) => {
                            let second_rubric = second.rubric.clone();
                            let second_result = self.build_result(second, true);
                            // Higher confidence wins; on a tie keep the
                            // second pass, which used more context.
                            if second_result.confidence >= result.confidence {
                                used_rubric = second_rubric;
                                result = second_result;
                            } else {
                                result.escalated = true;
                            }
                            tracing::debug!(
                                attempt_id = %cmd.attempt_id,
                                pct = result.percentage,
                                "escalation pass complete"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                attempt_id = %cmd.attempt_id,
                                error = %e,
                                "escalation pass failed, keeping first-pass result"
                            );
                        }
                    }
                }
            }
            EscalationMode::Manual if result.correctness == Correctness::Partial => {
                result.escalation_eligible = true;
            }
            _ => {}
        }

        if cmd.options.persist_weak_rubric && rubric::is_weak(&used_rubric, &self.config) {
            if let Err(e) = self.cache.put_cached_rubric(&question.id, &used_rubric).await {
                tracing::warn!(question_id = %question.id, error = %e, "rubric cache write failed");
            }
        }

        // Graded -> Delivered
        tracing::debug!(
            attempt_id = %cmd.attempt_id,
            pct = result.percentage,
            correctness = %result.correctness,
            escalated = result.escalated,
            "grading result delivered"
        );
        Ok(result)
    }

    /// Run one backend pass inside the remaining wall-clock budget.
    ///
    /// On expiry the in-flight future is dropped, so a late upstream result
    /// is discarded rather than applied.
    async fn assess_within(
        &self,
        request: &AssessRequest,
        remaining: Duration,
        budget_ms: u64,
    ) -> Result<AssessResponse, EngineError> {
        if remaining.is_zero() {
            return Err(EngineError::Timeout { budget_ms });
        }
        match tokio::time::timeout(remaining, self.backend.assess(request)).await {
            Err(_) => Err(EngineError::Timeout { budget_ms }),
            Ok(Err(e)) => Err(classify_backend_error(e, budget_ms)),
            Ok(Ok(outcome)) => {
                if outcome.rubric_scores.iter().map(|c| c.max_score).sum::<u32>() == 0 {
                    return Err(EngineError::UpstreamFailure(
                        "backend returned an empty rubric".into(),
                    ));
                }
                Ok(outcome)
            }
        }
    }

    fn build_result(&self, outcome: AssessResponse, escalated: bool) -> GradingResult {
        let (score, max_score) = rubric::sum_rubric(&outcome.rubric_scores);
        let max_score = max_score.max(1);
        let pct = rubric::percentage(score, max_score);
        GradingResult {
            run_id: Uuid::new_v4(),
            graded_at: Utc::now(),
            score,
            max_score,
            percentage: pct,
            correctness: rubric::classify(pct, false, &self.config),
            rubric_scores: outcome.rubric_scores,
            feedback: outcome.feedback,
            confidence: outcome.confidence,
            escalated,
            escalation_eligible: false,
        }
    }
}

fn grade_exact_item(
    accept: &[String],
    answer: &str,
    question: &Question,
    config: &GradingConfig,
) -> GradingResult {
    let (score, max_score) = rubric::grade_exact(accept, answer, question.qcs);
    let pct = rubric::percentage(score, max_score);
    let correctness = rubric::classify(pct, true, config);
    let summary = match correctness {
        Correctness::Correct => "Answer matches the expected response.".to_string(),
        _ => "Answer does not match the expected response.".to_string(),
    };
    GradingResult {
        run_id: Uuid::new_v4(),
        graded_at: Utc::now(),
        score,
        max_score,
        percentage: pct,
        correctness,
        rubric_scores: vec![CriterionScore {
            criterion: "exact match".into(),
            score,
            max_score,
            feedback: None,
        }],
        feedback: Feedback {
            summary,
            ..Default::default()
        },
        confidence: 1.0,
        escalated: false,
        escalation_eligible: false,
    }
}

/// Classify a backend failure: timeouts stay timeouts, everything else is an
/// upstream failure. Never downgraded to a score.
fn classify_backend_error(e: anyhow::Error, budget_ms: u64) -> EngineError {
    match e.downcast_ref::<BackendError>() {
        Some(backend) if backend.is_timeout() => EngineError::Timeout { budget_ms },
        Some(backend) => EngineError::UpstreamFailure(backend.to_string()),
        None => EngineError::UpstreamFailure(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::model::{Rubric, RubricCriterion};

    struct StubQuestions {
        question: Option<Question>,
    }

    #[async_trait]
    impl QuestionStore for StubQuestions {
        async fn resolve_question(&self, question_id: &str) -> Result<Question, EngineError> {
            self.question
                .clone()
                .filter(|q| q.id == question_id)
                .ok_or_else(|| EngineError::NotFound(format!("question {question_id}")))
        }
    }

    #[derive(Default)]
    struct RecordingCache {
        rubrics: Mutex<HashMap<String, Rubric>>,
    }

    #[async_trait]
    impl RubricCache for RecordingCache {
        async fn cached_rubric(&self, question_id: &str) -> anyhow::Result<Option<Rubric>> {
            Ok(self.rubrics.lock().unwrap().get(question_id).cloned())
        }

        async fn put_cached_rubric(
            &self,
            question_id: &str,
            rubric: &Rubric,
        ) -> anyhow::Result<()> {
            self.rubrics
                .lock()
                .unwrap()
                .insert(question_id.to_string(), rubric.clone());
            Ok(())
        }
    }

    struct StubBackend {
        standard: (u32, u32, f64),
        strict: Option<(u32, u32, f64)>,
        rubric_confidence: f64,
        delay: Option<Duration>,
        fail: bool,
        calls: AtomicU32,
    }

    impl StubBackend {
        fn scoring(score: u32, max: u32, confidence: f64) -> Self {
            Self {
                standard: (score, max, confidence),
                strict: None,
                rubric_confidence: 0.9,
                delay: None,
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl GradingBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn assess(&self, request: &AssessRequest) -> anyhow::Result<AssessResponse> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(BackendError::ApiError {
                    status: 503,
                    message: "grader unavailable".into(),
                }
                .into());
            }
            let (score, max, confidence) = match (request.strategy, self.strict) {
                (GradingStrategy::Strict, Some(strict)) => strict,
                _ => self.standard,
            };
            Ok(AssessResponse {
                rubric_scores: vec![CriterionScore {
                    criterion: "overall".into(),
                    score,
                    max_score: max,
                    feedback: None,
                }],
                rubric: Rubric {
                    criteria: vec![RubricCriterion {
                        name: "overall".into(),
                        max_score: max,
                        guidance: String::new(),
                    }],
                    confidence: self.rubric_confidence,
                },
                confidence,
                feedback: Feedback {
                    summary: "stub verdict".into(),
                    ..Default::default()
                },
            })
        }
    }

    fn exact_question() -> Question {
        Question {
            id: "q-exact".into(),
            stem: "What is 2 + 2?".into(),
            answer_key: AnswerKey::Exact {
                accept: vec!["4".into(), "four".into()],
            },
            subject: "arithmetic".into(),
            topics: vec!["addition".into()],
            difficulty: 1,
            qcs: 3,
        }
    }

    fn rubric_question() -> Question {
        Question {
            id: "q-essay".into(),
            stem: "Explain photosynthesis.".into(),
            answer_key: AnswerKey::Reference {
                answer: "Plants convert light into chemical energy.".into(),
            },
            subject: "biology".into(),
            topics: vec!["photosynthesis".into()],
            difficulty: 3,
            qcs: 10,
        }
    }

    fn orchestrator(
        question: Option<Question>,
        backend: Arc<StubBackend>,
        cache: Arc<RecordingCache>,
    ) -> GradingOrchestrator {
        GradingOrchestrator::new(
            Arc::new(StubQuestions { question }),
            backend,
            cache,
            GradingConfig::default(),
        )
    }

    fn command(question_id: &str, answer: &str, options: GradeOptions) -> GradeCommand {
        GradeCommand {
            attempt_id: "att-1".into(),
            question_id: question_id.into(),
            student_answer: Some(answer.into()),
            options,
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_without_backend_calls() {
        let backend = Arc::new(StubBackend::scoring(5, 10, 0.9));
        let orch = orchestrator(Some(rubric_question()), backend.clone(), Arc::default());

        let mut cmd = command("q-essay", "an answer", GradeOptions::default());
        cmd.attempt_id = String::new();
        let err = orch.grade(&cmd).await.unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let mut cmd = command("q-essay", "an answer", GradeOptions::default());
        cmd.student_answer = None;
        let err = orch.grade(&cmd).await.unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let backend = Arc::new(StubBackend::scoring(5, 10, 0.9));
        let orch = orchestrator(Some(rubric_question()), backend, Arc::default());
        let err = orch
            .grade(&command("q-missing", "answer", GradeOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn exact_item_grades_locally() {
        let backend = Arc::new(StubBackend::scoring(5, 10, 0.9));
        let orch = orchestrator(Some(exact_question()), backend.clone(), Arc::default());

        let result = orch
            .grade(&command("q-exact", "  FOUR ", GradeOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.percentage, 100);
        assert_eq!(result.correctness, Correctness::Correct);
        assert_eq!(result.score, 3);
        assert_eq!(backend.call_count(), 0);

        let miss = orch
            .grade(&command("q-exact", "5", GradeOptions::default()))
            .await
            .unwrap();
        assert_eq!(miss.percentage, 0);
        assert_eq!(miss.correctness, Correctness::Incorrect);
    }

    #[tokio::test]
    async fn empty_answer_is_graded_not_rejected() {
        let backend = Arc::new(StubBackend::scoring(5, 10, 0.9));
        let orch = orchestrator(Some(exact_question()), backend, Arc::default());
        let result = orch
            .grade(&command("q-exact", "", GradeOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.correctness, Correctness::Incorrect);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let mut backend = StubBackend::scoring(9, 10, 0.9);
        backend.delay = Some(Duration::from_millis(200));
        let orch = orchestrator(Some(rubric_question()), Arc::new(backend), Arc::default());

        let options = GradeOptions {
            max_latency_ms: 20,
            ..Default::default()
        };
        let err = orch
            .grade(&command("q-essay", "some answer", options))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn backend_failure_propagates_verbatim() {
        let mut backend = StubBackend::scoring(9, 10, 0.9);
        backend.fail = true;
        let orch = orchestrator(Some(rubric_question()), Arc::new(backend), Arc::default());
        let err = orch
            .grade(&command("q-essay", "some answer", GradeOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_failure");
    }

    #[tokio::test]
    async fn auto_escalation_keeps_second_pass_on_confidence_tie() {
        let mut backend = StubBackend::scoring(6, 10, 0.5); // partial band
        backend.strict = Some((8, 10, 0.5)); // tied confidence
        let backend = Arc::new(backend);
        let orch = orchestrator(Some(rubric_question()), backend.clone(), Arc::default());

        let result = orch
            .grade(&command("q-essay", "some answer", GradeOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.percentage, 80);
        assert!(result.escalated);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn auto_escalation_keeps_first_pass_when_more_confident() {
        let mut backend = StubBackend::scoring(6, 10, 0.9);
        backend.strict = Some((8, 10, 0.4));
        let orch = orchestrator(Some(rubric_question()), Arc::new(backend), Arc::default());

        let result = orch
            .grade(&command("q-essay", "some answer", GradeOptions::default()))
            .await
            .unwrap();
        assert_eq!(result.percentage, 60);
        assert!(result.escalated);
    }

    #[tokio::test]
    async fn manual_escalation_only_marks_eligibility() {
        let backend = Arc::new(StubBackend::scoring(6, 10, 0.5));
        let orch = orchestrator(Some(rubric_question()), backend.clone(), Arc::default());

        let options = GradeOptions {
            escalation: EscalationMode::Manual,
            ..Default::default()
        };
        let result = orch
            .grade(&command("q-essay", "some answer", options))
            .await
            .unwrap();
        assert!(result.escalation_eligible);
        assert!(!result.escalated);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn escalation_none_never_regrades() {
        let mut backend = StubBackend::scoring(6, 10, 0.5);
        backend.strict = Some((9, 10, 0.9));
        let backend = Arc::new(backend);
        let orch = orchestrator(Some(rubric_question()), backend.clone(), Arc::default());

        let options = GradeOptions {
            escalation: EscalationMode::None,
            ..Default::default()
        };
        let result = orch
            .grade(&command("q-essay", "some answer", options))
            .await
            .unwrap();
        assert_eq!(result.percentage, 60);
        assert!(!result.escalated);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn weak_rubric_is_persisted_when_requested() {
        let mut backend = StubBackend::scoring(9, 10, 0.9);
        backend.rubric_confidence = 0.3;
        let cache = Arc::new(RecordingCache::default());
        let orch = orchestrator(Some(rubric_question()), Arc::new(backend), cache.clone());

        let options = GradeOptions {
            persist_weak_rubric: true,
            ..Default::default()
        };
        orch.grade(&command("q-essay", "some answer", options))
            .await
            .unwrap();
        let stored = cache.rubrics.lock().unwrap();
        assert!(stored.contains_key("q-essay"));
    }

    #[tokio::test]
    async fn strong_rubric_is_not_persisted() {
        let backend = Arc::new(StubBackend::scoring(9, 10, 0.9));
        let cache = Arc::new(RecordingCache::default());
        let orch = orchestrator(Some(rubric_question()), backend, cache.clone());

        let options = GradeOptions {
            persist_weak_rubric: true,
            ..Default::default()
        };
        orch.grade(&command("q-essay", "some answer", options))
            .await
            .unwrap();
        assert!(cache.rubrics.lock().unwrap().is_empty());
    }
}
