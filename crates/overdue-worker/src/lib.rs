//! Overdue Worker - host process for overdue tracking
//!
//! Wires configuration, storage, the entity dispatcher and one change feed
//! consumer per partition into a long-running process.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use overdue_core::{
    ChangeFeedConsumer, ChangeFeedHub, Clock, EntityDispatcher, EntityStateStore,
    InMemoryEntityStateStore, InMemoryItemStore, ItemStore, OverdueConfig, OverdueError,
    PartitionStats, SystemClock,
};

/// Worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Core(#[from] OverdueError),

    /// A database path was configured but SQLite support is compiled out
    #[error("SQLite storage requested but the `sqlite` feature is disabled")]
    SqliteUnavailable,

    /// A consumer task panicked or was cancelled
    #[error("Consumer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Coarse health of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Not every partition has a running consumer
    Degraded,
}

/// Point-in-time health snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub partitions: u32,
    pub running_consumers: u32,
    pub pending_wake_ups: usize,
    pub active_mailboxes: usize,
}

/// The assembled worker
pub struct Worker {
    config: OverdueConfig,
    hub: Arc<ChangeFeedHub>,
    store: Arc<dyn ItemStore>,
    dispatcher: EntityDispatcher,
    consumer: ChangeFeedConsumer,
    running: Arc<AtomicU32>,
}

impl Worker {
    /// Build a worker on the system clock
    pub fn from_config(config: OverdueConfig) -> Result<Self, WorkerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a worker with an explicit clock
    pub fn with_clock(config: OverdueConfig, clock: Arc<dyn Clock>) -> Result<Self, WorkerError> {
        config.validate().map_err(OverdueError::from)?;
        let hub = Arc::new(ChangeFeedHub::new(config.feed.clone()));
        let (store, states) = open_storage(&config, hub.clone())?;

        let dispatcher = EntityDispatcher::new(
            store.clone(),
            states,
            clock.clone(),
            config.timer.clone(),
        );
        let consumer =
            ChangeFeedConsumer::new(store.clone(), Arc::new(dispatcher.clone()), clock);

        Ok(Self {
            config,
            hub,
            store,
            dispatcher,
            consumer,
            running: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn config(&self) -> &OverdueConfig {
        &self.config
    }

    /// The authoritative item store; upserts here reach the consumers
    pub fn store(&self) -> Arc<dyn ItemStore> {
        self.store.clone()
    }

    pub fn dispatcher(&self) -> &EntityDispatcher {
        &self.dispatcher
    }

    /// Current health snapshot
    pub fn health(&self) -> HealthReport {
        let partitions = self.hub.partitions();
        let running_consumers = self.running.load(Ordering::SeqCst);
        HealthReport {
            status: if running_consumers == partitions {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            partitions,
            running_consumers,
            pending_wake_ups: self.dispatcher.pending_wake_ups(),
            active_mailboxes: self.dispatcher.active_mailboxes(),
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Restores persisted timer entities, consumes every partition, then
    /// stops the consumers, lets in-flight entity messages finish and aborts
    /// pending wake-ups.
    pub async fn run<F>(&self, shutdown: F) -> Result<Vec<PartitionStats>, WorkerError>
    where
        F: Future<Output = ()>,
    {
        let restored = self.dispatcher.restore()?;
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut consumers = Vec::new();
        for partition in 0..self.hub.partitions() {
            let mut feed = self.hub.subscribe(partition).map_err(OverdueError::from)?;
            let consumer = self.consumer.clone();
            let stop = stop_rx.clone();
            let running = self.running.clone();
            consumers.push(tokio::spawn(async move {
                running.fetch_add(1, Ordering::SeqCst);
                let stats = consumer.run_partition(&mut feed, stop).await;
                running.fetch_sub(1, Ordering::SeqCst);
                stats
            }));
        }

        info!(
            partitions = self.hub.partitions(),
            restored, "worker running"
        );

        shutdown.await;
        info!("shutdown requested");
        if stop_tx.send(true).is_err() {
            warn!("all consumers already stopped");
        }

        let mut stats = Vec::with_capacity(consumers.len());
        for consumer in consumers {
            stats.push(consumer.await?);
        }

        self.dispatcher.drain().await;
        self.dispatcher.shutdown();
        info!(batches = stats.iter().map(|s| s.batches_succeeded).sum::<u64>(), "worker stopped");
        Ok(stats)
    }
}

type Storage = (Arc<dyn ItemStore>, Arc<dyn EntityStateStore>);

fn open_storage(config: &OverdueConfig, hub: Arc<ChangeFeedHub>) -> Result<Storage, WorkerError> {
    match &config.storage.database_path {
        Some(path) => open_sqlite(path, hub),
        None => {
            info!("using in-memory storage");
            Ok((
                Arc::new(InMemoryItemStore::with_hub(hub)),
                Arc::new(InMemoryEntityStateStore::new()),
            ))
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &std::path::Path, hub: Arc<ChangeFeedHub>) -> Result<Storage, WorkerError> {
    let store = Arc::new(overdue_core::SqliteItemStore::open(path, hub).map_err(OverdueError::from)?);
    info!("using SQLite storage at {:?}", path);
    Ok((store.clone(), store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: &std::path::Path, _hub: Arc<ChangeFeedHub>) -> Result<Storage, WorkerError> {
    Err(WorkerError::SqliteUnavailable)
}
