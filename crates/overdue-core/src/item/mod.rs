//! Deadline-bearing work items
//!
//! A todo item moves through `todo`/`inprogress` and ends in either `done`
//! or `overdue`. Only non-terminal items with a due date ever need a timer.

mod state;
mod todo;

pub use state::ItemState;
pub use todo::{ItemId, TodoItem};
