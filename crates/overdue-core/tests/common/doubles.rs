//! Test doubles for the item store, the change feed and the entity command
//! sink

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use overdue_core::config::FeedConfig;
use overdue_core::error::StoreError;
use overdue_core::{
    ChangeFeed, EntityCommand, EntityCommandSink, FeedBatch, InMemoryItemStore, ItemStore,
    Result, TodoItem,
};

/// In-memory store whose upserts fail for selected ids
pub struct FlakyStore {
    pub inner: InMemoryItemStore,
    failing: Mutex<HashSet<String>>,
    upserts: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryItemStore::new(FeedConfig {
                partitions: 1,
                ..FeedConfig::default()
            }),
            failing: Mutex::new(HashSet::new()),
            upserts: Mutex::new(Vec::new()),
        }
    }

    /// Make upserts of `id` fail with a write conflict
    pub fn fail_upserts_of(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Let upserts of `id` succeed again
    pub fn recover(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    /// Ids of successful upserts, in order
    pub fn upserts(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemStore for FlakyStore {
    async fn read(&self, id: &str) -> std::result::Result<Option<TodoItem>, StoreError> {
        self.inner.read(id).await
    }

    async fn upsert(&self, item: TodoItem) -> std::result::Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(&item.id) {
            return Err(StoreError::Conflict(item.id));
        }
        let id = item.id.clone();
        self.inner.upsert(item).await?;
        self.upserts.lock().unwrap().push(id);
        Ok(())
    }
}

/// Records every command instead of delivering it
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(String, EntityCommand)>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<(String, EntityCommand)> {
        self.delivered.lock().unwrap().clone()
    }
}

impl EntityCommandSink for RecordingSink {
    fn deliver(&self, id: &str, command: EntityCommand) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((id.to_string(), command));
        Ok(())
    }
}

/// Deliveries and completions seen by a [`RecordingFeed`]
#[derive(Debug, Clone, Default)]
pub struct FeedLog {
    /// `(sequence, attempt)` of every delivered batch
    pub delivered: Vec<(u64, u32)>,
    /// `(sequence, attempt, succeeded)` of every completed batch
    pub completed: Vec<(u64, u32, bool)>,
}

/// Change feed wrapper that logs traffic in both directions
pub struct RecordingFeed<F> {
    inner: F,
    log: Arc<Mutex<FeedLog>>,
}

impl<F: ChangeFeed> RecordingFeed<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(FeedLog::default())),
        }
    }

    /// Shared handle to the log, usable after the feed moved into a task
    pub fn log(&self) -> Arc<Mutex<FeedLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl<F: ChangeFeed> ChangeFeed for RecordingFeed<F> {
    fn partition(&self) -> u32 {
        self.inner.partition()
    }

    async fn next_batch(&mut self) -> Option<FeedBatch> {
        let batch = self.inner.next_batch().await?;
        self.log
            .lock()
            .unwrap()
            .delivered
            .push((batch.sequence, batch.attempt));
        Some(batch)
    }

    async fn complete(&mut self, batch: FeedBatch, succeeded: bool) {
        self.log
            .lock()
            .unwrap()
            .completed
            .push((batch.sequence, batch.attempt, succeeded));
        self.inner.complete(batch, succeeded).await;
    }
}
