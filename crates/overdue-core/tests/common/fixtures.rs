//! Items, clocks and wiring used across integration tests

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use overdue_core::{
    ChangeFeedConsumer, Clock, EntityDispatcher, EntityStateStore, InMemoryEntityStateStore,
    ItemStore, TimerConfig, TodoItem,
};

/// Fixed reference time for tests that do not advance time
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-16T09:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// An item in `todo` due `minutes` after `now` (negative for the past)
pub fn item_due(id: &str, now: DateTime<Utc>, minutes: i64) -> TodoItem {
    TodoItem::new(id, "weekly-review", &format!("Task {}", id), now)
        .with_due_date(now + Duration::minutes(minutes))
}

/// Feed document for an item
pub fn document(item: &TodoItem) -> Value {
    serde_json::to_value(item).unwrap()
}

/// Wall time following tokio's clock, so paused tests can auto-advance
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.started;
        self.origin + Duration::from_std(elapsed).unwrap()
    }
}

/// Dispatcher plus consumer over shared storage
pub struct Pipeline {
    pub dispatcher: EntityDispatcher,
    pub consumer: ChangeFeedConsumer,
    pub states: Arc<dyn EntityStateStore>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ItemStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_states(store, Arc::new(InMemoryEntityStateStore::new()), clock)
    }

    pub fn with_states(
        store: Arc<dyn ItemStore>,
        states: Arc<dyn EntityStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatcher = EntityDispatcher::new(
            store.clone(),
            states.clone(),
            clock.clone(),
            TimerConfig::default(),
        );
        let consumer = ChangeFeedConsumer::new(store, Arc::new(dispatcher.clone()), clock);
        Self {
            dispatcher,
            consumer,
            states,
        }
    }

    /// Ids of all live timer entities, sorted
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .all()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        ids.sort();
        ids
    }
}
