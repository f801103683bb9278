//! Partitioned change feed
//!
//! Mutated items are routed to a partition by a stable hash of their id, so
//! every mutation of one item is seen in order by one consumer. Delivery is
//! at-least-once: a batch completed as failed comes back until it succeeds
//! or runs out of attempts.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::FeedConfig;
use crate::error::{FeedError, StoreError};
use crate::item::TodoItem;

/// A batch of raw item documents from one partition
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBatch {
    /// Partition the batch was read from
    pub partition: u32,
    /// Per-partition batch sequence number (stable across redeliveries)
    pub sequence: u64,
    /// Delivery attempt, starting at 1
    pub attempt: u32,
    /// Mutated item documents, in feed order
    pub documents: Vec<Value>,
}

/// One partition of the change feed
#[async_trait]
pub trait ChangeFeed: Send {
    /// Partition index this feed reads
    fn partition(&self) -> u32;

    /// Wait for the next batch. `None` once the feed is closed.
    async fn next_batch(&mut self) -> Option<FeedBatch>;

    /// Report the outcome of a batch; failed batches are redelivered.
    async fn complete(&mut self, batch: FeedBatch, succeeded: bool);
}

/// Fan-out of item mutations into partitions
pub struct ChangeFeedHub {
    config: FeedConfig,
    senders: Vec<mpsc::UnboundedSender<Value>>,
    receivers: Mutex<Vec<Option<mpsc::UnboundedReceiver<Value>>>>,
}

impl ChangeFeedHub {
    /// Create a hub with `config.partitions` partitions
    pub fn new(config: FeedConfig) -> Self {
        let partitions = config.partitions.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..partitions)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel::<Value>();
                (tx, Some(rx))
            })
            .unzip();

        Self {
            config,
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    /// Number of partitions
    pub fn partitions(&self) -> u32 {
        self.senders.len() as u32
    }

    /// Partition an item id maps to
    pub fn partition_for(&self, id: &str) -> u32 {
        stable_hash(id) % self.partitions()
    }

    /// Publish a mutated item to its partition
    pub fn publish(&self, item: &TodoItem) -> Result<(), StoreError> {
        let document = serde_json::to_value(item)?;
        self.publish_document(self.partition_for(&item.id), document);
        Ok(())
    }

    /// Publish a raw document to an explicit partition.
    ///
    /// Used for documents that may not decode into an item at all.
    pub fn publish_document(&self, partition: u32, document: Value) {
        let Some(sender) = self.senders.get(partition as usize) else {
            warn!("dropping change for unknown partition {}", partition);
            return;
        };
        if sender.send(document).is_err() {
            debug!("partition {} has no live subscriber, change dropped", partition);
        }
    }

    /// Take the single subscription for a partition
    pub fn subscribe(&self, partition: u32) -> Result<MemoryChangeFeed, FeedError> {
        let mut receivers = self.receivers.lock().unwrap_or_else(|e| e.into_inner());
        let slot = receivers
            .get_mut(partition as usize)
            .ok_or(FeedError::PartitionOutOfRange {
                partition,
                partitions: self.partitions(),
            })?;
        let rx = slot.take().ok_or(FeedError::AlreadySubscribed(partition))?;

        Ok(MemoryChangeFeed {
            partition,
            rx,
            redeliveries: VecDeque::new(),
            next_sequence: 0,
            max_batch_size: self.config.max_batch_size.max(1),
            max_delivery_attempts: self.config.max_delivery_attempts.max(1),
            redelivery_delay: self.config.redelivery_delay(),
        })
    }
}

/// FNV-1a, stable across processes and platforms
fn stable_hash(id: &str) -> u32 {
    id.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Channel-backed partition subscription handed out by [`ChangeFeedHub`]
pub struct MemoryChangeFeed {
    partition: u32,
    rx: mpsc::UnboundedReceiver<Value>,
    redeliveries: VecDeque<FeedBatch>,
    next_sequence: u64,
    max_batch_size: usize,
    max_delivery_attempts: u32,
    redelivery_delay: Duration,
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    fn partition(&self) -> u32 {
        self.partition
    }

    async fn next_batch(&mut self) -> Option<FeedBatch> {
        if !self.redeliveries.is_empty() {
            tokio::time::sleep(self.redelivery_delay).await;
            return self.redeliveries.pop_front();
        }

        let first = self.rx.recv().await?;
        let mut documents = vec![first];
        while documents.len() < self.max_batch_size {
            match self.rx.try_recv() {
                Ok(document) => documents.push(document),
                Err(_) => break,
            }
        }

        self.next_sequence += 1;
        Some(FeedBatch {
            partition: self.partition,
            sequence: self.next_sequence,
            attempt: 1,
            documents,
        })
    }

    async fn complete(&mut self, mut batch: FeedBatch, succeeded: bool) {
        if succeeded {
            debug!(
                partition = batch.partition,
                sequence = batch.sequence,
                "batch checkpointed"
            );
            return;
        }

        if batch.attempt >= self.max_delivery_attempts {
            error!(
                partition = batch.partition,
                sequence = batch.sequence,
                attempts = batch.attempt,
                documents = batch.documents.len(),
                "batch dead-lettered after repeated failures"
            );
            return;
        }

        batch.attempt += 1;
        warn!(
            partition = batch.partition,
            sequence = batch.sequence,
            attempt = batch.attempt,
            "batch failed, scheduling redelivery"
        );
        self.redeliveries.push_front(batch);
    }
}
