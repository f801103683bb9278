//! Item Store Gateway
//!
//! The authoritative item records live behind [`ItemStore`]. Every upsert
//! is also published to a partitioned change feed ([`ChangeFeedHub`]) which
//! the consumer reads batch by batch.

mod feed;
mod memory;

pub use feed::{ChangeFeed, ChangeFeedHub, FeedBatch, MemoryChangeFeed};
pub use memory::InMemoryItemStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::item::TodoItem;

/// The trait that all item storage backends implement.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point read by identity. A missing item is `Ok(None)`.
    async fn read(&self, id: &str) -> Result<Option<TodoItem>, StoreError>;

    /// Insert or replace an item (last writer wins).
    async fn upsert(&self, item: TodoItem) -> Result<(), StoreError>;
}
