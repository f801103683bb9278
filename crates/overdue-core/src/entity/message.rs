//! Timer entity message protocol

use chrono::{DateTime, Utc};

use super::WakeUpToken;
use crate::error::Result;
use crate::item::TodoItem;

/// Messages outside callers may send to a timer entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityCommand {
    /// Create the entity or reschedule its wake-up from an item snapshot
    Create(Box<TodoItem>),
    /// Erase the entity and its pending wake-up
    Delete,
}

impl EntityCommand {
    pub fn create(item: TodoItem) -> Self {
        EntityCommand::Create(Box::new(item))
    }
}

/// Everything a timer entity mailbox can process
#[derive(Debug, Clone, PartialEq)]
pub enum TimerMessage {
    Create(Box<TodoItem>),
    /// Delivered only by the entity's own armed wake-up
    Reevaluate(WakeUpToken),
    Delete,
}

impl TimerMessage {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TimerMessage::Create(_) => "create",
            TimerMessage::Reevaluate(_) => "reevaluate",
            TimerMessage::Delete => "delete",
        }
    }
}

impl From<EntityCommand> for TimerMessage {
    fn from(command: EntityCommand) -> Self {
        match command {
            EntityCommand::Create(item) => TimerMessage::Create(item),
            EntityCommand::Delete => TimerMessage::Delete,
        }
    }
}

/// What handling a message did to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    /// A wake-up is pending at the given time
    Armed(DateTime<Utc>),
    /// The item was transitioned to overdue and the entity deleted
    MarkedOverdue,
    /// The entity no longer exists
    Deleted,
    /// A superseded or orphaned wake-up was ignored
    Stale,
}

/// Addressed, in-order delivery of commands to timer entities
pub trait EntityCommandSink: Send + Sync {
    fn deliver(&self, id: &str, command: EntityCommand) -> Result<()>;
}
