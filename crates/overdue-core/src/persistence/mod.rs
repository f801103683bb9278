//! SQLite persistence
//!
//! Items and timer entity snapshots share one database file so a restarted
//! worker finds both its authoritative records and its pending wake-ups.

mod schema;
mod sqlite_store;

pub use schema::{Schema, SCHEMA_VERSION};
pub use sqlite_store::SqliteItemStore;
