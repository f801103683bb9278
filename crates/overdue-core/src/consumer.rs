//! Change notification consumer
//!
//! Reads batches of mutated items from a change feed partition and decides,
//! per item, between a direct overdue write and delegating to the item's
//! timer entity.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::entity::{EntityCommand, EntityCommandSink};
use crate::error::{OverdueError, Result};
use crate::item::{ItemState, TodoItem};
use crate::store::{ChangeFeed, ItemStore};

/// What the consumer did with one mutated item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDisposition {
    /// Written back as overdue without involving the timer entity
    MarkedOverdue,
    /// `create` sent to the timer entity
    Scheduled,
    /// `delete` sent to the timer entity
    Retired,
}

/// Per-batch counts of each disposition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub marked_overdue: usize,
    pub scheduled: usize,
    pub retired: usize,
}

impl BatchSummary {
    fn record(&mut self, disposition: ItemDisposition) {
        match disposition {
            ItemDisposition::MarkedOverdue => self.marked_overdue += 1,
            ItemDisposition::Scheduled => self.scheduled += 1,
            ItemDisposition::Retired => self.retired += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.marked_overdue + self.scheduled + self.retired
    }
}

/// Batch counters of one partition loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub batches_succeeded: u64,
    pub batches_failed: u64,
}

/// Keep the last document per item id, in feed order. Documents without a
/// string id are kept so they fail decoding on their own.
fn latest_versions(documents: &[Value]) -> Vec<&Value> {
    fn id_of(doc: &Value) -> Option<&str> {
        doc.get("id").and_then(Value::as_str)
    }
    let mut last = HashMap::new();
    for (index, doc) in documents.iter().enumerate() {
        if let Some(id) = id_of(doc) {
            last.insert(id, index);
        }
    }

    documents
        .iter()
        .enumerate()
        .filter(|(index, doc)| id_of(*doc).map_or(true, |id| last[id] == *index))
        .map(|(_, doc)| doc)
        .collect()
}

/// Consumes change feed batches
#[derive(Clone)]
pub struct ChangeFeedConsumer {
    store: Arc<dyn ItemStore>,
    entities: Arc<dyn EntityCommandSink>,
    clock: Arc<dyn Clock>,
}

impl ChangeFeedConsumer {
    pub fn new(
        store: Arc<dyn ItemStore>,
        entities: Arc<dyn EntityCommandSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entities,
            clock,
        }
    }

    /// Handle a single mutated item document
    pub async fn process_item(&self, document: &Value) -> Result<ItemDisposition> {
        let mut item = TodoItem::decode(document)?;
        let now = self.clock.now();

        if item.state != ItemState::Overdue && item.is_past_due(now) {
            item.mark_overdue(now);
            let id = item.id.clone();
            self.store.upsert(item).await?;
            info!(id = %id, "item past due, marked overdue");
            return Ok(ItemDisposition::MarkedOverdue);
        }

        if item.due_date.is_none() || item.state == ItemState::Overdue || item.is_past_due(now) {
            debug!(id = %item.id, state = %item.state, "no timer needed");
            self.entities.deliver(&item.id, EntityCommand::Delete)?;
            return Ok(ItemDisposition::Retired);
        }

        let id = item.id.clone();
        debug!(id = %id, due = ?item.due_date, "scheduling timer");
        self.entities.deliver(&id, EntityCommand::create(item))?;
        Ok(ItemDisposition::Scheduled)
    }

    /// Handle every item of a batch concurrently.
    ///
    /// Only the last version of each item in the batch is handled. A failing
    /// item never stops its siblings; failures are collected and reported
    /// once the whole batch has been processed.
    pub async fn process_batch(&self, documents: &[Value]) -> Result<BatchSummary> {
        let latest = latest_versions(documents);
        if latest.len() < documents.len() {
            debug!(
                superseded = documents.len() - latest.len(),
                "skipping superseded versions in batch"
            );
        }
        let outcomes = join_all(latest.into_iter().map(|doc| self.process_item(doc))).await;

        let mut summary = BatchSummary::default();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(disposition) => summary.record(disposition),
                Err(err) => {
                    warn!(error = %err, "item in batch failed");
                    errors.push(err);
                }
            }
        }

        debug!(
            marked_overdue = summary.marked_overdue,
            scheduled = summary.scheduled,
            retired = summary.retired,
            failed = errors.len(),
            "batch processed"
        );

        OverdueError::from_batch(errors).map(|()| summary)
    }

    /// Consume one partition until the feed closes or `shutdown` flips to
    /// true (or its sender is dropped).
    pub async fn run_partition<F>(
        &self,
        feed: &mut F,
        mut shutdown: watch::Receiver<bool>,
    ) -> PartitionStats
    where
        F: ChangeFeed + ?Sized,
    {
        let partition = feed.partition();
        let mut stats = PartitionStats::default();
        info!(partition, "consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                batch = feed.next_batch() => batch,
            };
            let Some(batch) = batch else {
                debug!(partition, "feed closed");
                break;
            };

            match self.process_batch(&batch.documents).await {
                Ok(summary) => {
                    debug!(
                        partition,
                        sequence = batch.sequence,
                        items = summary.total(),
                        "batch succeeded"
                    );
                    stats.batches_succeeded += 1;
                    feed.complete(batch, true).await;
                }
                Err(err) => {
                    warn!(
                        partition,
                        sequence = batch.sequence,
                        attempt = batch.attempt,
                        failures = err.failure_count(),
                        error = %err,
                        "batch failed"
                    );
                    stats.batches_failed += 1;
                    feed.complete(batch, false).await;
                }
            }
        }

        info!(
            partition,
            succeeded = stats.batches_succeeded,
            failed = stats.batches_failed,
            "consumer stopped"
        );
        stats
    }
}
