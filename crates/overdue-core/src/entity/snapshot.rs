//! Persisted timer entity state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::TodoItem;

/// Identifies one armed wake-up; a fired wake-up whose token no longer
/// matches the entity's is superseded and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WakeUpToken(pub Uuid);

impl WakeUpToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WakeUpToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WakeUpToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single pending wake-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeUp {
    pub at: DateTime<Utc>,
    pub token: WakeUpToken,
}

impl WakeUp {
    /// A fresh wake-up at `at`
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            token: WakeUpToken::new(),
        }
    }
}

/// Timer entity snapshot: the last item seen and the one pending wake-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    /// Mirrors the item id
    pub id: String,
    pub todo_item: TodoItem,
    pub wake_up: WakeUp,
}

impl TimerSnapshot {
    pub fn new(todo_item: TodoItem, wake_up: WakeUp) -> Self {
        Self {
            id: todo_item.id.clone(),
            todo_item,
            wake_up,
        }
    }
}
