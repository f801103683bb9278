//! Timer entity handlers
//!
//! Every due-date decision goes through [`TimerEntity::reevaluate`], which
//! re-reads the authoritative item instead of trusting the snapshot. That
//! makes missed, duplicated or reordered wake-ups harmless: the worst a
//! stray wake-up can do is find nothing to do.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{
    EntityOutcome, EntityStateStore, TimerMessage, TimerSnapshot, WakeUp, WakeUpToken,
};
use crate::clock::Clock;
use crate::error::{EntityError, Result};
use crate::item::TodoItem;
use crate::store::ItemStore;

/// Scheduling substrate for wake-ups.
///
/// At most one wake-up exists per identity: arming replaces whatever was
/// armed before.
pub trait WakeUpScheduler: Send + Sync {
    /// Deliver `reevaluate(wake_up.token)` to `id` at or after `wake_up.at`
    fn arm(&self, id: &str, wake_up: WakeUp);

    /// Drop the pending wake-up for `id`, if any
    fn cancel(&self, id: &str);
}

/// Collaborators a timer entity works with
#[derive(Clone, Copy)]
pub struct EntityContext<'a> {
    pub store: &'a dyn ItemStore,
    pub states: &'a dyn EntityStateStore,
    pub wake_ups: &'a dyn WakeUpScheduler,
    pub clock: &'a dyn Clock,
}

/// One timer entity, addressed by item identity.
///
/// Callers must not run two handlers for the same identity concurrently;
/// the dispatcher guarantees this.
pub struct TimerEntity<'a> {
    id: &'a str,
    ctx: EntityContext<'a>,
}

impl<'a> TimerEntity<'a> {
    pub fn new(id: &'a str, ctx: EntityContext<'a>) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub(crate) async fn handle(&self, message: TimerMessage) -> Result<EntityOutcome> {
        match message {
            TimerMessage::Create(item) => self.create(*item),
            TimerMessage::Reevaluate(token) => self.reevaluate(token).await,
            TimerMessage::Delete => self.delete(),
        }
    }

    /// Store the snapshot and arm a wake-up at its due date.
    ///
    /// Items without a due date, or already past it, need no timer and the
    /// entity is deleted instead.
    pub fn create(&self, item: TodoItem) -> Result<EntityOutcome> {
        if item.id != self.id {
            return Err(EntityError::InvalidIdentity(item.id).into());
        }

        let now = self.ctx.clock.now();
        match item.due_date {
            Some(due) if due > now => self.arm(item, due),
            _ => {
                debug!(id = self.id, "no future due date, timer not needed");
                self.delete()
            }
        }
    }

    /// Handle a fired wake-up.
    pub(crate) async fn reevaluate(&self, token: WakeUpToken) -> Result<EntityOutcome> {
        let Some(snapshot) = self.ctx.states.load(self.id)? else {
            debug!(id = self.id, "wake-up for absent entity ignored");
            return Ok(EntityOutcome::Stale);
        };
        if snapshot.wake_up.token != token {
            debug!(id = self.id, %token, "superseded wake-up ignored");
            return Ok(EntityOutcome::Stale);
        }

        let Some(mut item) = self.ctx.store.read(self.id).await? else {
            warn!(id = self.id, "item missing from store, retiring timer");
            return self.delete();
        };

        if !item.requires_timer() {
            debug!(id = self.id, state = %item.state, "timer no longer required");
            return self.delete();
        }

        let now = self.ctx.clock.now();
        if item.is_past_due(now) {
            item.mark_overdue(now);
            self.ctx.store.upsert(item).await?;
            info!(id = self.id, "item marked overdue");
            self.delete()?;
            return Ok(EntityOutcome::MarkedOverdue);
        }

        match item.due_date {
            Some(due) => self.arm(item, due),
            None => self.delete(),
        }
    }

    /// Erase all state for this identity. Deleting an absent entity is a no-op.
    pub fn delete(&self) -> Result<EntityOutcome> {
        if self.ctx.states.remove(self.id)? {
            info!(id = self.id, "deleting entity");
        }
        self.ctx.wake_ups.cancel(self.id);
        Ok(EntityOutcome::Deleted)
    }

    fn arm(&self, item: TodoItem, at: DateTime<Utc>) -> Result<EntityOutcome> {
        let snapshot = TimerSnapshot::new(item, WakeUp::at(at));
        self.ctx.states.save(&snapshot)?;
        self.ctx.wake_ups.arm(self.id, snapshot.wake_up);
        debug!(id = self.id, %at, "wake-up armed");
        Ok(EntityOutcome::Armed(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FeedConfig;
    use crate::entity::InMemoryEntityStateStore;
    use crate::error::{OverdueError, StoreError};
    use crate::item::ItemState;
    use crate::store::{ChangeFeed, InMemoryItemStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Scheduled {
        Armed(String, WakeUp),
        Cancelled(String),
    }

    #[derive(Default)]
    struct RecordingScheduler {
        calls: Mutex<Vec<Scheduled>>,
    }

    impl RecordingScheduler {
        fn calls(&self) -> Vec<Scheduled> {
            self.calls.lock().unwrap().clone()
        }

        fn armed(&self) -> Vec<WakeUp> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Scheduled::Armed(_, w) => Some(w),
                    Scheduled::Cancelled(_) => None,
                })
                .collect()
        }
    }

    impl WakeUpScheduler for RecordingScheduler {
        fn arm(&self, id: &str, wake_up: WakeUp) {
            self.calls
                .lock()
                .unwrap()
                .push(Scheduled::Armed(id.to_string(), wake_up));
        }

        fn cancel(&self, id: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Scheduled::Cancelled(id.to_string()));
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl ItemStore for UnavailableStore {
        async fn read(&self, _id: &str) -> std::result::Result<Option<TodoItem>, StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }

        async fn upsert(&self, _item: TodoItem) -> std::result::Result<(), StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }
    }

    struct Harness {
        store: InMemoryItemStore,
        states: InMemoryEntityStateStore,
        wake_ups: RecordingScheduler,
        clock: ManualClock,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: InMemoryItemStore::new(FeedConfig {
                    partitions: 1,
                    ..FeedConfig::default()
                }),
                states: InMemoryEntityStateStore::new(),
                wake_ups: RecordingScheduler::default(),
                clock: ManualClock::new(start()),
            }
        }

        fn entity<'a>(&'a self, id: &'a str) -> TimerEntity<'a> {
            TimerEntity::new(
                id,
                EntityContext {
                    store: &self.store,
                    states: &self.states,
                    wake_ups: &self.wake_ups,
                    clock: &self.clock,
                },
            )
        }

        fn token(&self, id: &str) -> WakeUpToken {
            self.states.load(id).unwrap().unwrap().wake_up.token
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-04T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn item_due_in(id: &str, minutes: i64) -> TodoItem {
        TodoItem::new(id, "list", "Quarterly report", start())
            .with_due_date(start() + Duration::minutes(minutes))
    }

    #[test]
    fn test_create_without_due_date_self_deletes() {
        let h = Harness::new();
        let item = TodoItem::new("a", "list", "Someday", start());

        let outcome = h.entity("a").create(item).unwrap();

        assert_eq!(outcome, EntityOutcome::Deleted);
        assert!(h.states.load("a").unwrap().is_none());
        assert!(h.wake_ups.armed().is_empty());
    }

    #[test]
    fn test_create_past_due_self_deletes() {
        let h = Harness::new();
        let outcome = h.entity("a").create(item_due_in("a", -5)).unwrap();

        assert_eq!(outcome, EntityOutcome::Deleted);
        assert!(h.states.is_empty());
        assert!(h.wake_ups.armed().is_empty());
    }

    #[test]
    fn test_create_arms_at_due_date() {
        let h = Harness::new();
        let item = item_due_in("a", 30);

        let outcome = h.entity("a").create(item.clone()).unwrap();

        let due = start() + Duration::minutes(30);
        assert_eq!(outcome, EntityOutcome::Armed(due));
        let snapshot = h.states.load("a").unwrap().unwrap();
        assert_eq!(snapshot.todo_item, item);
        assert_eq!(snapshot.wake_up.at, due);
        assert_eq!(
            h.wake_ups.calls(),
            vec![Scheduled::Armed("a".into(), snapshot.wake_up)]
        );
    }

    #[test]
    fn test_create_rejects_foreign_item() {
        let h = Harness::new();
        let result = h.entity("a").create(item_due_in("b", 30));
        assert!(matches!(
            result,
            Err(OverdueError::Entity(EntityError::InvalidIdentity(_)))
        ));
        assert!(h.states.is_empty());
    }

    #[tokio::test]
    async fn test_rearm_supersedes_earlier_wake_up() {
        let h = Harness::new();
        h.store.seed(item_due_in("a", 60));

        h.entity("a").create(item_due_in("a", 30)).unwrap();
        let first = h.token("a");
        h.entity("a").create(item_due_in("a", 60)).unwrap();
        let second = h.token("a");
        assert_ne!(first, second);

        // The earlier wake-up fires late and must do nothing
        h.clock.advance(Duration::minutes(31));
        let outcome = h.entity("a").reevaluate(first).await.unwrap();
        assert_eq!(outcome, EntityOutcome::Stale);
        assert_eq!(h.token("a"), second);
        assert_eq!(h.store.get("a").unwrap().state, ItemState::Todo);

        h.clock.advance(Duration::minutes(30));
        let outcome = h.entity("a").reevaluate(second).await.unwrap();
        assert_eq!(outcome, EntityOutcome::MarkedOverdue);
    }

    #[tokio::test]
    async fn test_reevaluate_is_idempotent() {
        let h = Harness::new();
        let mut feed = h.store.hub().subscribe(0).unwrap();
        h.store.seed(item_due_in("a", 10));
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");

        h.clock.advance(Duration::minutes(11));
        let first = h.entity("a").reevaluate(token).await.unwrap();
        let second = h.entity("a").reevaluate(token).await.unwrap();

        assert_eq!(first, EntityOutcome::MarkedOverdue);
        assert_eq!(second, EntityOutcome::Stale);
        assert!(h.states.load("a").unwrap().is_none());

        let stored = h.store.get("a").unwrap();
        assert_eq!(stored.state, ItemState::Overdue);
        assert_eq!(stored.updated_date, Some(h.clock.now()));

        // Exactly one upsert reached the change feed
        let batch = feed.next_batch().await.unwrap();
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.documents[0]["state"], "overdue");
    }

    #[tokio::test]
    async fn test_reevaluate_missing_item_deletes_entity() {
        let h = Harness::new();
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");

        h.clock.advance(Duration::minutes(11));
        let outcome = h.entity("a").reevaluate(token).await.unwrap();

        assert_eq!(outcome, EntityOutcome::Deleted);
        assert!(h.states.is_empty());
        assert_eq!(
            h.wake_ups.calls().last(),
            Some(&Scheduled::Cancelled("a".into()))
        );
    }

    #[tokio::test]
    async fn test_reevaluate_completed_item_deletes_without_write() {
        let h = Harness::new();
        h.store.seed(item_due_in("a", 10).with_state(ItemState::Done));
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");

        h.clock.advance(Duration::minutes(11));
        let outcome = h.entity("a").reevaluate(token).await.unwrap();

        assert_eq!(outcome, EntityOutcome::Deleted);
        assert_eq!(h.store.get("a").unwrap().state, ItemState::Done);
        assert!(h.states.is_empty());
    }

    #[tokio::test]
    async fn test_reevaluate_cleared_due_date_deletes() {
        let h = Harness::new();
        h.store.seed(TodoItem::new("a", "list", "Undated", start()));
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");

        h.clock.advance(Duration::minutes(11));
        assert_eq!(
            h.entity("a").reevaluate(token).await.unwrap(),
            EntityOutcome::Deleted
        );
    }

    #[tokio::test]
    async fn test_reevaluate_rearms_when_due_date_moved() {
        let h = Harness::new();
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");
        let moved = item_due_in("a", 120);
        h.store.seed(moved.clone());

        h.clock.advance(Duration::minutes(11));
        let outcome = h.entity("a").reevaluate(token).await.unwrap();

        let due = start() + Duration::minutes(120);
        assert_eq!(outcome, EntityOutcome::Armed(due));
        let snapshot = h.states.load("a").unwrap().unwrap();
        assert_eq!(snapshot.todo_item, moved);
        assert_eq!(snapshot.wake_up.at, due);
        assert_ne!(snapshot.wake_up.token, token);
        assert_eq!(h.wake_ups.armed().len(), 2);
    }

    #[tokio::test]
    async fn test_early_wake_up_rearms_at_same_due_date() {
        let h = Harness::new();
        h.store.seed(item_due_in("a", 10));
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let token = h.token("a");

        h.clock.advance(Duration::minutes(9));
        let outcome = h.entity("a").reevaluate(token).await.unwrap();

        assert_eq!(outcome, EntityOutcome::Armed(start() + Duration::minutes(10)));
        assert_eq!(h.store.get("a").unwrap().state, ItemState::Todo);
    }

    #[test]
    fn test_delete_absent_entity_is_noop() {
        let h = Harness::new();
        assert_eq!(h.entity("ghost").delete().unwrap(), EntityOutcome::Deleted);
        assert!(h.states.is_empty());
    }

    #[tokio::test]
    async fn test_transient_read_failure_keeps_snapshot() {
        let h = Harness::new();
        h.entity("a").create(item_due_in("a", 10)).unwrap();
        let before = h.states.load("a").unwrap().unwrap();
        h.clock.advance(Duration::minutes(11));

        let entity = TimerEntity::new(
            "a",
            EntityContext {
                store: &UnavailableStore,
                states: &h.states,
                wake_ups: &h.wake_ups,
                clock: &h.clock,
            },
        );
        let result = entity.reevaluate(before.wake_up.token).await;

        assert!(matches!(result, Err(OverdueError::Store(StoreError::Storage(_)))));
        assert_eq!(h.states.load("a").unwrap(), Some(before));
    }

    #[tokio::test]
    async fn test_handle_routes_messages() {
        let h = Harness::new();
        let entity = h.entity("a");

        let armed = entity
            .handle(TimerMessage::Create(Box::new(item_due_in("a", 5))))
            .await
            .unwrap();
        assert!(matches!(armed, EntityOutcome::Armed(_)));

        let deleted = entity.handle(TimerMessage::Delete).await.unwrap();
        assert_eq!(deleted, EntityOutcome::Deleted);
        assert!(h.states.is_empty());
    }
}
