//! SQLite schema for items and timer entity snapshots

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Authoritative item records; the full document is kept so every field
-- round-trips, the other columns exist for lookups
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    list_id TEXT NOT NULL,
    state TEXT NOT NULL,
    due_date TEXT,
    updated_date TEXT,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_state ON items(state);
CREATE INDEX IF NOT EXISTS idx_items_due ON items(due_date);

-- Timer entity snapshots (one row per live entity)
CREATE TABLE IF NOT EXISTS timer_entities (
    id TEXT PRIMARY KEY,
    wake_up_at TEXT NOT NULL,
    wake_up_token TEXT NOT NULL,
    todo_item TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_timer_entities_wake_up ON timer_entities(wake_up_at);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(_from_version: u32, _to_version: u32) -> Option<&'static str> {
        // (1, 2) => Some("ALTER TABLE ..."),
        None
    }
}
