//! In-memory document store.
//!
//! Every write acquires the single interior lock once and applies its whole
//! delta inside it, so a fold commits entirely or not at all and concurrent
//! writers only ever interleave whole increments. The idempotency mark is a
//! set insertion, which is the compare-and-set the aggregation contract
//! requires.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skillforge_core::model::{DailyAggregate, DailyDelta, Rubric, TopicMastery};
use skillforge_core::traits::{
    AggregateStore, MasterySnapshot, RubricCache, TopicCounters,
};

#[derive(Default)]
struct Inner {
    /// `(uid, day)` -> rollup.
    daily: HashMap<(String, String), DailyAggregate>,
    /// `(uid, topic)` -> counters.
    topics: HashMap<(String, String), TopicCounters>,
    /// `(uid, topic)` -> derived mastery document.
    mastery: HashMap<(String, String), TopicMastery>,
    /// `(uid, topic)` -> day-keyed mastery observations.
    snapshots: HashMap<(String, String), BTreeMap<String, f64>>,
    /// Folded event ids.
    aggregated: HashSet<String>,
    /// Cached rubrics keyed by question id.
    rubrics: HashMap<String, Rubric>,
}

/// In-memory `AggregateStore` for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RubricCache for MemoryStore {
    async fn cached_rubric(&self, question_id: &str) -> anyhow::Result<Option<Rubric>> {
        Ok(self.inner.lock().unwrap().rubrics.get(question_id).cloned())
    }

    async fn put_cached_rubric(&self, question_id: &str, rubric: &Rubric) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .rubrics
            .insert(question_id.to_string(), rubric.clone());
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn increment_daily(
        &self,
        uid: &str,
        day: &str,
        delta: &DailyDelta,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .daily
            .entry((uid.to_string(), day.to_string()))
            .or_default()
            .apply(delta);
        Ok(())
    }

    async fn increment_topic(
        &self,
        uid: &str,
        topic: &str,
        attempts: u64,
        correct: u64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<TopicCounters> {
        let mut inner = self.inner.lock().unwrap();
        let counters = inner
            .topics
            .entry((uid.to_string(), topic.to_string()))
            .or_insert_with(|| TopicCounters {
                attempts: 0,
                correct: 0,
                last_activity: at,
            });
        counters.attempts += attempts;
        counters.correct += correct;
        // max() keeps the advance commutative under reordered folds.
        counters.last_activity = counters.last_activity.max(at);
        Ok(counters.clone())
    }

    async fn try_mark_aggregated(&self, event_id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.aggregated.insert(event_id.to_string()))
    }

    async fn daily_aggregate(
        &self,
        uid: &str,
        day: &str,
    ) -> anyhow::Result<Option<DailyAggregate>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .daily
            .get(&(uid.to_string(), day.to_string()))
            .cloned())
    }

    async fn put_topic_mastery(&self, uid: &str, mastery: &TopicMastery) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .mastery
            .insert((uid.to_string(), mastery.topic_id.clone()), mastery.clone());
        Ok(())
    }

    async fn topic_mastery(
        &self,
        uid: &str,
        topic: &str,
    ) -> anyhow::Result<Option<TopicMastery>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mastery
            .get(&(uid.to_string(), topic.to_string()))
            .cloned())
    }

    async fn all_topic_mastery(&self, uid: &str) -> anyhow::Result<Vec<TopicMastery>> {
        let inner = self.inner.lock().unwrap();
        let mut docs: Vec<TopicMastery> = inner
            .mastery
            .iter()
            .filter(|((owner, _), _)| owner == uid)
            .map(|(_, doc)| doc.clone())
            .collect();
        docs.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(docs)
    }

    async fn record_mastery_snapshot(
        &self,
        uid: &str,
        topic: &str,
        day: &str,
        mastery: f64,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .snapshots
            .entry((uid.to_string(), topic.to_string()))
            .or_default()
            .insert(day.to_string(), mastery);
        Ok(())
    }

    async fn mastery_snapshot_at_or_before(
        &self,
        uid: &str,
        topic: &str,
        day: &str,
    ) -> anyhow::Result<Option<MasterySnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .snapshots
            .get(&(uid.to_string(), topic.to_string()))
            .and_then(|days| days.range(..=day.to_string()).next_back())
            .map(|(day, mastery)| MasterySnapshot {
                day: day.clone(),
                mastery: *mastery,
            }))
    }
}
