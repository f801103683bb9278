//! SQLite-backed item store and timer entity state store

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::schema::{Schema, SCHEMA_VERSION};
use crate::entity::{EntityStateStore, TimerSnapshot, WakeUp, WakeUpToken};
use crate::error::StoreError;
use crate::item::{ItemState, TodoItem};
use crate::store::{ChangeFeedHub, ItemStore};

/// Durable store for items and timer entity snapshots.
///
/// Every upsert through [`ItemStore`] is published to the change feed hub.
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
    hub: Arc<ChangeFeedHub>,
}

impl SqliteItemStore {
    /// Open (or create) a database at `path`
    pub fn open(path: impl AsRef<Path>, hub: Arc<ChangeFeedHub>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, hub)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory(hub: Arc<ChangeFeedHub>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, hub)
    }

    fn from_connection(conn: Connection, hub: Arc<ChangeFeedHub>) -> Result<Self, StoreError> {
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hub,
        })
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        let current_version = Self::schema_version(conn).unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(Schema::create_tables())?;
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)?;
                }
            }
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
        } else if current_version > SCHEMA_VERSION {
            return Err(StoreError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                actual: current_version,
            });
        }

        Ok(())
    }

    fn schema_version(conn: &Connection) -> Option<u32> {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .ok()
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("connection lock poisoned: {}", e)))
    }

    /// The hub upserts are published to
    pub fn hub(&self) -> Arc<ChangeFeedHub> {
        self.hub.clone()
    }

    // ==================== Item Operations ====================

    /// Get an item by ID
    pub fn get_item(&self, id: &str) -> Result<Option<TodoItem>, StoreError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT document FROM items WHERE id = ?1",
            [id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(document) => Ok(Some(serde_json::from_str(&document)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an item without publishing a change (seeding, imports)
    pub fn save_item(&self, item: &TodoItem) -> Result<(), StoreError> {
        let document = serde_json::to_string(item)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO items (id, list_id, state, due_date, updated_date, document)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                item.id,
                item.list_id,
                item.state.as_str(),
                item.due_date.map(|d| d.to_rfc3339()),
                item.updated_date.map(|d| d.to_rfc3339()),
                document,
            ],
        )?;
        Ok(())
    }

    /// Get all items in a state
    pub fn items_in_state(&self, state: ItemState) -> Result<Vec<TodoItem>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT document FROM items WHERE state = ?1 ORDER BY id")?;
        let documents = stmt
            .query_map([state.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|document| serde_json::from_str(document).map_err(StoreError::from))
            .collect()
    }

    // ==================== Timer Entity Operations ====================

    fn row_to_snapshot(
        (id, at, token, item): (String, String, String, String),
    ) -> Result<TimerSnapshot, StoreError> {
        let at = DateTime::parse_from_rfc3339(&at)
            .map_err(|e| StoreError::Serialization(format!("wake-up time for {}: {}", id, e)))?
            .with_timezone(&Utc);
        let token = Uuid::parse_str(&token)
            .map_err(|e| StoreError::Serialization(format!("wake-up token for {}: {}", id, e)))?;

        Ok(TimerSnapshot {
            id,
            todo_item: serde_json::from_str(&item)?,
            wake_up: WakeUp {
                at,
                token: WakeUpToken(token),
            },
        })
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn read(&self, id: &str) -> Result<Option<TodoItem>, StoreError> {
        self.get_item(id)
    }

    async fn upsert(&self, item: TodoItem) -> Result<(), StoreError> {
        self.save_item(&item)?;
        self.hub.publish(&item)
    }
}

impl EntityStateStore for SqliteItemStore {
    fn load(&self, id: &str) -> Result<Option<TimerSnapshot>, StoreError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, wake_up_at, wake_up_token, todo_item FROM timer_entities WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        );

        match result {
            Ok(row) => Self::row_to_snapshot(row).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &TimerSnapshot) -> Result<(), StoreError> {
        let item = serde_json::to_string(&snapshot.todo_item)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO timer_entities (id, wake_up_at, wake_up_token, todo_item)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            rusqlite::params![
                snapshot.id,
                snapshot.wake_up.at.to_rfc3339(),
                snapshot.wake_up.token.to_string(),
                item,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM timer_entities WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    fn all(&self) -> Result<Vec<TimerSnapshot>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, wake_up_at, wake_up_token, todo_item FROM timer_entities ORDER BY wake_up_at",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::row_to_snapshot).collect()
    }
}
