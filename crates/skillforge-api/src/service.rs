//! The transport-agnostic scoring service.
//!
//! Embedding applications (an HTTP layer, a queue consumer, a scheduled
//! job) call these handlers; everything here is policy, not transport.

use std::sync::Arc;

use chrono::Utc;

use skillforge_core::aggregate::Aggregator;
use skillforge_core::config::EngineConfig;
use skillforge_core::error::EngineError;
use skillforge_core::mastery;
use skillforge_core::model::TopicMastery;
use skillforge_core::orchestrator::{GradeCommand, GradingOrchestrator};
use skillforge_core::traits::{
    AggregateStore, Authenticator, GradingBackend, Principal, QuestionStore, RateLimiter,
    RubricCache,
};

use crate::types::{
    AnswerEventChange, ErrorBody, GradeApiRequest, GradeApiResponse, HealthStatus,
};

/// Rate-limit action key for grading calls.
const GRADE_ACTION: &str = "grade_answer";

/// The assembled scoring service.
pub struct ScoringService {
    auth: Arc<dyn Authenticator>,
    limiter: Arc<dyn RateLimiter>,
    orchestrator: GradingOrchestrator,
    aggregator: Aggregator,
    store: Arc<dyn AggregateStore>,
    config: EngineConfig,
}

impl ScoringService {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        limiter: Arc<dyn RateLimiter>,
        questions: Arc<dyn QuestionStore>,
        backend: Arc<dyn GradingBackend>,
        store: Arc<dyn AggregateStore>,
        config: EngineConfig,
    ) -> Self {
        let cache: Arc<dyn RubricCache> = store.clone();
        let orchestrator =
            GradingOrchestrator::new(questions, backend, cache, config.grading.clone());
        let aggregator = Aggregator::new(store.clone(), config.mastery.clone());
        Self {
            auth,
            limiter,
            orchestrator,
            aggregator,
            store,
            config,
        }
    }

    /// Grading endpoint.
    pub async fn grade(
        &self,
        principal: &Principal,
        request: GradeApiRequest,
    ) -> Result<GradeApiResponse, ErrorBody> {
        let uid = self.auth.assert_authenticated(principal)?;
        self.limiter
            .enforce(
                &uid,
                GRADE_ACTION,
                self.config.limits.grade_max_per_window,
                self.config.limits.window_secs,
            )
            .await?;

        let options = request.resolved_options(&self.config.grading);
        let command = GradeCommand {
            attempt_id: request.attempt_id,
            question_id: request.question_id,
            student_answer: request.student_answer,
            options,
        };
        let result = self.orchestrator.grade(&command).await?;
        Ok(result.into())
    }

    /// Aggregation trigger: fire-and-forget from the caller's perspective.
    ///
    /// Failures are logged, never surfaced; re-delivery is absorbed by the
    /// fold's idempotency mark.
    pub async fn on_answer_event(&self, change: &AnswerEventChange) {
        match self
            .aggregator
            .apply_change(change.before.as_ref(), &change.after)
            .await
        {
            Ok(outcome) => {
                tracing::debug!(event_id = %change.after.id, ?outcome, "answer event processed");
            }
            Err(e) => {
                tracing::error!(event_id = %change.after.id, error = %e, "aggregation fold failed");
            }
        }
    }

    /// Mastery read API: one topic.
    pub async fn topic_mastery(
        &self,
        principal: &Principal,
        topic_id: &str,
    ) -> Result<TopicMastery, ErrorBody> {
        let uid = self.auth.assert_authenticated(principal)?;
        self.store
            .topic_mastery(&uid, topic_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| EngineError::NotFound(format!("topic mastery {topic_id}")).into())
    }

    /// Mastery read API: every topic the user has touched.
    pub async fn all_skill_mastery(
        &self,
        principal: &Principal,
    ) -> Result<Vec<TopicMastery>, ErrorBody> {
        let uid = self.auth.assert_authenticated(principal)?;
        self.store
            .all_topic_mastery(&uid)
            .await
            .map_err(store_failure)
    }

    /// Inactivity decay pass over the user's mastery documents.
    ///
    /// Safe to run on any schedule: each application recomputes from
    /// `last_activity`, so repeated runs without new activity do not
    /// compound.
    pub async fn run_decay_pass(
        &self,
        principal: &Principal,
    ) -> Result<Vec<TopicMastery>, ErrorBody> {
        let uid = self.auth.assert_authenticated(principal)?;
        let now = Utc::now();
        let mut updated = Vec::new();
        for doc in self
            .store
            .all_topic_mastery(&uid)
            .await
            .map_err(store_failure)?
        {
            let decayed = mastery::decay_pass(
                &doc,
                &self.config.mastery.bands,
                &self.config.mastery.decay,
                now,
            );
            if decayed.mastery != doc.mastery {
                tracing::info!(
                    uid = %uid,
                    topic = %doc.topic_id,
                    from = doc.mastery,
                    to = decayed.mastery,
                    "mastery decayed"
                );
                self.store
                    .put_topic_mastery(&uid, &decayed)
                    .await
                    .map_err(store_failure)?;
            }
            updated.push(decayed);
        }
        Ok(updated)
    }

    /// Liveness probe; no side effects.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::ok()
    }
}

fn store_failure(e: anyhow::Error) -> ErrorBody {
    ErrorBody::from(EngineError::UpstreamFailure(format!("document store: {e}")))
}
