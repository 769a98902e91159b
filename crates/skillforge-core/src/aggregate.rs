//! Analytics aggregation: fold finalized answer events into daily rollups
//! and per-topic mastery.
//!
//! Folds are expressed as commutative increments (see `model::DailyDelta`),
//! so concurrent aggregation of events for the same user/day is
//! order-independent. Re-delivery of the same finalized event is absorbed by
//! a compare-and-set idempotency mark keyed by event id.

use std::sync::Arc;

use anyhow::Error;
use chrono::{DateTime, Duration, Utc};

use crate::config::MasteryConfig;
use crate::error::EngineError;
use crate::mastery;
use crate::model::{AnswerEvent, DailyDelta, TopicMastery};
use crate::traits::{AggregateStore, TopicCounters};

/// ISO calendar date bucket (`%Y-%m-%d`, UTC) for a timestamp.
pub fn day_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// What a fold did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Finalized event folded into the day aggregate and topic mastery.
    Folded { day: String, topics: usize },
    /// Draft event counted toward `attempted` only.
    DraftCounted { day: String },
    /// Idempotency mark was already set; nothing changed.
    AlreadyAggregated,
    /// The state transition carries no aggregation work (e.g. an edit to an
    /// already-final record).
    Skipped,
}

/// Folds answer events into the document store.
pub struct Aggregator {
    store: Arc<dyn AggregateStore>,
    config: MasteryConfig,
}

impl Aggregator {
    pub fn new(store: Arc<dyn AggregateStore>, config: MasteryConfig) -> Self {
        Self { store, config }
    }

    /// Storage-trigger entry point: fold based on the before/after state of
    /// one answer event record. Folds on draft creation and on the
    /// non-final → final transition; every other write is a no-op.
    pub async fn apply_change(
        &self,
        before: Option<&AnswerEvent>,
        after: &AnswerEvent,
    ) -> Result<FoldOutcome, EngineError> {
        let was_final = before.map(|b| b.is_final).unwrap_or(false);
        if after.is_final && !was_final {
            self.aggregate(after).await
        } else if !after.is_final && before.is_none() {
            self.aggregate(after).await
        } else {
            Ok(FoldOutcome::Skipped)
        }
    }

    /// Fold one answer event. Invoked once per write to the event's storage
    /// record; safe under at-least-once delivery.
    pub async fn aggregate(&self, event: &AnswerEvent) -> Result<FoldOutcome, EngineError> {
        if event.user_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument("user_id is required".into()));
        }

        if !event.is_final {
            return self.fold_draft(event).await;
        }

        // Check-and-set before folding: a second delivery of the same event
        // must not double-count.
        let fresh = self
            .store
            .try_mark_aggregated(&event.id)
            .await
            .map_err(store_failure)?;
        if !fresh {
            tracing::debug!(event_id = %event.id, "event already aggregated, skipping");
            return Ok(FoldOutcome::AlreadyAggregated);
        }

        let finalized_at = event.finalized_at.unwrap_or_else(Utc::now);
        let day = day_key(finalized_at);
        let is_correct = event.is_correct.unwrap_or(false);

        let delta = DailyDelta::finalized(event, is_correct);
        self.store
            .increment_daily(&event.user_id, &day, &delta)
            .await
            .map_err(store_failure)?;

        let topics = event.distinct_topics();
        for topic in &topics {
            let counters = self
                .store
                .increment_topic(&event.user_id, topic, 1, is_correct as u64, finalized_at)
                .await
                .map_err(store_failure)?;
            self.refresh_mastery(&event.user_id, topic, &counters)
                .await?;
        }

        tracing::info!(
            event_id = %event.id,
            user_id = %event.user_id,
            day = %day,
            correct = is_correct,
            topics = topics.len(),
            "answer event folded"
        );
        Ok(FoldOutcome::Folded {
            day,
            topics: topics.len(),
        })
    }

    async fn fold_draft(&self, event: &AnswerEvent) -> Result<FoldOutcome, EngineError> {
        // Drafts bucket into the current day; only finalized events use
        // their finalization timestamp.
        let day = day_key(Utc::now());
        let delta = DailyDelta::draft(event);
        self.store
            .increment_daily(&event.user_id, &day, &delta)
            .await
            .map_err(store_failure)?;
        tracing::debug!(event_id = %event.id, user_id = %event.user_id, day = %day, "draft counted");
        Ok(FoldOutcome::DraftCounted { day })
    }

    /// Recompute the derived mastery document from post-increment counters
    /// and record a snapshot for trend lookups.
    async fn refresh_mastery(
        &self,
        uid: &str,
        topic: &str,
        counters: &TopicCounters,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let score = mastery::recompute(counters.attempts, counters.correct);

        let cutoff = day_key(now - Duration::days(7));
        let prior = self
            .store
            .mastery_snapshot_at_or_before(uid, topic, &cutoff)
            .await
            .map_err(store_failure)?;

        let doc = TopicMastery {
            topic_id: topic.to_string(),
            mastery: score,
            level: mastery::level_for(score, &self.config.bands),
            attempts: counters.attempts,
            correct: counters.correct,
            last_activity: counters.last_activity,
            trend_7d: mastery::trend_7d(score, prior.as_ref()),
        };
        self.store
            .put_topic_mastery(uid, &doc)
            .await
            .map_err(store_failure)?;
        self.store
            .record_mastery_snapshot(uid, topic, &day_key(now), score)
            .await
            .map_err(store_failure)?;
        Ok(())
    }
}

fn store_failure(e: Error) -> EngineError {
    EngineError::UpstreamFailure(format!("document store: {e}"))
}
