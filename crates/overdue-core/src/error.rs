//! Error types for overdue-core

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for overdue operations
pub type Result<T> = std::result::Result<T, OverdueError>;

/// Main error type for overdue operations
#[derive(Error, Debug)]
pub enum OverdueError {
    /// Item store errors (reads, upserts, persisted entity state)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Timer entity and dispatch errors
    #[error("Entity error: {0}")]
    Entity(#[from] EntityError),

    /// Change feed errors
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A change notification that could not be turned into an item
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// More than one item of a batch failed
    #[error("{} items in batch failed: [{}]", .0.len(), join_errors(.0))]
    Batch(Vec<OverdueError>),
}

impl OverdueError {
    /// Fold the per-item failures of a batch into the batch outcome.
    ///
    /// No failures is success, a single failure is reported as itself and
    /// anything more is wrapped in [`OverdueError::Batch`].
    pub fn from_batch(mut errors: Vec<OverdueError>) -> std::result::Result<(), OverdueError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(OverdueError::Batch(errors)),
        }
    }

    /// Number of underlying failures this error represents
    pub fn failure_count(&self) -> usize {
        match self {
            OverdueError::Batch(errors) => errors.len(),
            _ => 1,
        }
    }
}

fn join_errors(errors: &[OverdueError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Item store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend failure (connectivity, conflicts, poisoned locks)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Write rejected because of a conflicting concurrent write
    #[error("Write conflict on item {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
}

/// Timer entity and dispatcher errors
#[derive(Error, Debug)]
pub enum EntityError {
    /// The mailbox for an entity is gone (runtime shutting down)
    #[error("Mailbox closed for entity {0}")]
    MailboxClosed(String),

    /// An entity identity was empty
    #[error("Invalid entity identity: {0:?}")]
    InvalidIdentity(String),
}

/// Change feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    /// Partition index outside the configured range
    #[error("Partition {partition} out of range (partitions: {partitions})")]
    PartitionOutOfRange { partition: u32, partitions: u32 },

    /// Partition already has a subscriber
    #[error("Partition {0} already subscribed")]
    AlreadySubscribed(u32),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for OverdueError {
    fn from(err: rusqlite::Error) -> Self {
        OverdueError::Store(StoreError::from(err))
    }
}

impl From<serde_json::Error> for OverdueError {
    fn from(err: serde_json::Error) -> Self {
        OverdueError::Store(StoreError::from(err))
    }
}
