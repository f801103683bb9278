//! Item state
//!
//! ```text
//! Todo ↔ InProgress → Done
//!   ↓        ↓
//! Overdue  Overdue
//! ```

use serde::{Deserialize, Serialize};

/// The state of a todo item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Not started
    #[default]
    Todo,
    /// Being worked on
    #[serde(rename = "inprogress", alias = "in-progress")]
    InProgress,
    /// Completed
    Done,
    /// Due date passed before completion
    Overdue,
}

impl ItemState {
    /// Check if the item is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Done | ItemState::Overdue)
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Todo => "todo",
            ItemState::InProgress => "inprogress",
            ItemState::Done => "done",
            ItemState::Overdue => "overdue",
        }
    }

    /// Parse a state from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(ItemState::Todo),
            "inprogress" | "in-progress" => Some(ItemState::InProgress),
            "done" => Some(ItemState::Done),
            "overdue" => Some(ItemState::Overdue),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
