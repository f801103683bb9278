//! Storage for timer entity snapshots

use std::collections::HashMap;
use std::sync::RwLock;

use super::TimerSnapshot;
use crate::error::StoreError;

/// Durable home of timer entity snapshots.
///
/// An identity with no stored snapshot is a logically absent entity.
pub trait EntityStateStore: Send + Sync {
    /// Load the snapshot for an identity
    fn load(&self, id: &str) -> Result<Option<TimerSnapshot>, StoreError>;

    /// Insert or replace a snapshot
    fn save(&self, snapshot: &TimerSnapshot) -> Result<(), StoreError>;

    /// Erase a snapshot. Returns whether one existed.
    fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// All stored snapshots
    fn all(&self) -> Result<Vec<TimerSnapshot>, StoreError>;
}

/// In-memory snapshot store
#[derive(Debug, Default)]
pub struct InMemoryEntityStateStore {
    snapshots: RwLock<HashMap<String, TimerSnapshot>>,
}

impl InMemoryEntityStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Storage(format!("lock poisoned: {}", err))
}

impl EntityStateStore for InMemoryEntityStateStore {
    fn load(&self, id: &str) -> Result<Option<TimerSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.get(id).cloned())
    }

    fn save(&self, snapshot: &TimerSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        Ok(snapshots.remove(id).is_some())
    }

    fn all(&self) -> Result<Vec<TimerSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.values().cloned().collect())
    }
}
