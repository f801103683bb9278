//! In-memory item store

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{ChangeFeedHub, ItemStore};
use crate::config::FeedConfig;
use crate::error::StoreError;
use crate::item::TodoItem;

/// Item store backed by a `HashMap`, publishing every upsert to its hub
pub struct InMemoryItemStore {
    items: RwLock<HashMap<String, TodoItem>>,
    hub: Arc<ChangeFeedHub>,
}

impl InMemoryItemStore {
    /// Create an empty store with its own change feed
    pub fn new(feed: FeedConfig) -> Self {
        Self::with_hub(Arc::new(ChangeFeedHub::new(feed)))
    }

    /// Create an empty store publishing to an existing hub
    pub fn with_hub(hub: Arc<ChangeFeedHub>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            hub,
        }
    }

    /// The change feed this store publishes to
    pub fn hub(&self) -> Arc<ChangeFeedHub> {
        Arc::clone(&self.hub)
    }

    /// Insert or replace an item without publishing a change
    pub fn seed(&self, item: TodoItem) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.insert(item.id.clone(), item);
    }

    /// Remove an item without publishing a change (upstream deletion)
    pub fn remove(&self, id: &str) -> Option<TodoItem> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.remove(id)
    }

    /// Synchronous lookup
    pub fn get(&self, id: &str) -> Option<TodoItem> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn read(&self, id: &str) -> Result<Option<TodoItem>, StoreError> {
        let items = self
            .items
            .read()
            .map_err(|e| StoreError::Storage(format!("lock poisoned: {}", e)))?;
        Ok(items.get(id).cloned())
    }

    async fn upsert(&self, item: TodoItem) -> Result<(), StoreError> {
        {
            let mut items = self
                .items
                .write()
                .map_err(|e| StoreError::Storage(format!("lock poisoned: {}", e)))?;
            items.insert(item.id.clone(), item.clone());
        }
        self.hub.publish(&item)
    }
}
