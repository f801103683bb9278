//! Todo item record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemState;
use crate::error::{OverdueError, Result};

/// Opaque item identity, stable for the item's lifetime
pub type ItemId = String;

/// A deadline-bearing unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Unique identifier
    #[serde(default)]
    pub id: ItemId,
    /// Owning list
    #[serde(default)]
    pub list_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
}

impl TodoItem {
    /// Create a new `todo` item created at `now`
    pub fn new(
        id: impl Into<ItemId>,
        list_id: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            list_id: list_id.into(),
            name: name.into(),
            description: None,
            state: ItemState::Todo,
            due_date: None,
            completed_date: None,
            created_date: Some(now),
            updated_date: None,
        }
    }

    /// Set the due date
    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Set the state
    pub fn with_state(mut self, state: ItemState) -> Self {
        self.state = state;
        self
    }

    /// Decode a raw change-feed document.
    ///
    /// Documents that do not parse, or that carry no identity, are
    /// rejected as malformed notifications.
    pub fn decode(document: &serde_json::Value) -> Result<Self> {
        let item: TodoItem = serde_json::from_value(document.clone())
            .map_err(|e| OverdueError::MalformedNotification(e.to_string()))?;

        if item.id.trim().is_empty() {
            return Err(OverdueError::MalformedNotification(
                "notification has no item id".to_string(),
            ));
        }

        Ok(item)
    }

    /// Check if the due date has been reached
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| due <= now)
    }

    /// Check if a pending wake-up is still useful for this item
    pub fn requires_timer(&self) -> bool {
        !self.state.is_terminal() && self.due_date.is_some()
    }

    /// Transition to `overdue`, stamping the update time
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) {
        self.state = ItemState::Overdue;
        self.updated_date = Some(now);
    }
}
