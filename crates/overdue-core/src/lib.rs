//! Overdue Core - Per-item timers that flag todo items as overdue
//!
//! This crate provides the core functionality for overdue tracking:
//!
//! - **Item**: Todo items and their lifecycle states (todo, inprogress, done, overdue)
//! - **Store**: The item store gateway contract, an in-memory store and a partitioned change feed
//! - **Entity**: Per-item timer entities with a single pending wake-up each
//! - **Dispatcher**: In-order, per-identity message delivery and wake-up scheduling
//! - **Consumer**: Change feed consumer choosing between a direct overdue write and the timer entity
//! - **Persistence**: SQLite storage for items and timer snapshots (feature `sqlite`)
//! - **Config**: Feed, timer and storage configuration
//!
//! # Architecture
//!
//! ```text
//! ItemStore ──upsert──► ChangeFeedHub ──batches──► ChangeFeedConsumer
//!     ▲                                            │           │
//!     │                                 overdue write    create / delete
//!     │                                            ▼           ▼
//!     └────────── read / upsert ◄── TimerEntity ◄── EntityDispatcher ◄── wake-ups
//! ```
//!
//! Wake-up handling always re-reads the authoritative item, so missed,
//! duplicated or reordered wake-ups cannot leave an item in the wrong state.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod entity;
pub mod error;
pub mod item;
#[cfg(feature = "sqlite")]
pub mod persistence;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FeedConfig, OverdueConfig, StorageConfig, TimerConfig};
pub use consumer::{BatchSummary, ChangeFeedConsumer, ItemDisposition, PartitionStats};
pub use entity::{
    EntityCommand, EntityCommandSink, EntityDispatcher, EntityOutcome, EntityStateStore,
    InMemoryEntityStateStore, TimerEntity, TimerSnapshot, WakeUp, WakeUpScheduler, WakeUpToken,
};
pub use error::{OverdueError, Result};
pub use item::{ItemId, ItemState, TodoItem};
#[cfg(feature = "sqlite")]
pub use persistence::{Schema, SqliteItemStore};
pub use store::{ChangeFeed, ChangeFeedHub, FeedBatch, InMemoryItemStore, ItemStore, MemoryChangeFeed};

/// Returns the version of overdue-core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
