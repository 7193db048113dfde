//! Persistence for the sync queue, the global checkpoint, and per-entity sync
//! annotations.

use rusqlite::{params, Connection, OptionalExtension};

use super::columns::parse_column;
use crate::error::{Error, Result};
use crate::models::{
    ActionId, QueueItemUpdate, SyncAction, SyncMeta, SyncMetaUpdate, SyncStatus, SyncTable,
};

const QUEUE_COLUMNS: &str = "id, table_name, operation, entity_id, payload, timestamp, retry_count";

/// `SQLite` access to the sync-internal tables
pub struct SqliteSyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncAction> {
        let payload: String = row.get(4)?;
        Ok(SyncAction {
            id: parse_column(row, 0)?,
            table: parse_column(row, 1)?,
            operation: parse_column(row, 2)?,
            entity_id: row.get(3)?,
            payload: serde_json::from_str(&payload).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, error.into())
            })?,
            timestamp: row.get(5)?,
            retry_count: row.get(6)?,
        })
    }

    /// All queued actions, oldest enqueue first
    pub fn queue_all(&self) -> Result<Vec<SyncAction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY timestamp ASC, rowid ASC"
        ))?;
        let actions = stmt
            .query_map([], Self::parse_action)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(actions)
    }

    pub fn queue_get(&self, id: &ActionId) -> Result<Option<SyncAction>> {
        let action = self
            .conn
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?"),
                params![id.as_str()],
                Self::parse_action,
            )
            .optional()?;
        Ok(action)
    }

    /// The pending action for an entity, if any
    pub fn queue_find(&self, table: SyncTable, entity_id: &str) -> Result<Option<SyncAction>> {
        let action = self
            .conn
            .query_row(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE table_name = ? AND entity_id = ?"
                ),
                params![table.as_str(), entity_id],
                Self::parse_action,
            )
            .optional()?;
        Ok(action)
    }

    pub fn queue_insert(&self, action: &SyncAction) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO sync_queue ({QUEUE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                action.id.as_str(),
                action.table.as_str(),
                action.operation.as_str(),
                action.entity_id,
                serde_json::to_string(&action.payload)?,
                action.timestamp,
                action.retry_count,
            ],
        )?;
        Ok(())
    }

    /// Apply a partial update; returns the updated action
    pub fn queue_update(&self, id: &ActionId, update: &QueueItemUpdate) -> Result<SyncAction> {
        let mut action = self
            .queue_get(id)?
            .ok_or_else(|| Error::NotFound(format!("sync action {id}")))?;

        if let Some(operation) = update.operation {
            action.operation = operation;
        }
        if let Some(payload) = &update.payload {
            action.payload.clone_from(payload);
        }
        if let Some(timestamp) = update.timestamp {
            action.timestamp = timestamp;
        }
        if let Some(retry_count) = update.retry_count {
            action.retry_count = retry_count;
        }

        self.conn.execute(
            "UPDATE sync_queue
             SET operation = ?, payload = ?, timestamp = ?, retry_count = ?
             WHERE id = ?",
            params![
                action.operation.as_str(),
                serde_json::to_string(&action.payload)?,
                action.timestamp,
                action.retry_count,
                id.as_str(),
            ],
        )?;
        Ok(action)
    }

    /// Returns whether an action was removed
    pub fn queue_remove(&self, id: &ActionId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }

    /// Remove an action only if no enqueue touched it since `timestamp`
    pub fn queue_remove_if_unchanged(&self, id: &ActionId, timestamp: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sync_queue WHERE id = ? AND timestamp = ?",
            params![id.as_str(), timestamp],
        )?;
        Ok(rows > 0)
    }

    pub fn queue_clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sync_queue", [])?;
        Ok(())
    }

    pub fn queue_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn meta_get(&self) -> Result<Option<SyncMeta>> {
        let meta = self
            .conn
            .query_row(
                "SELECT last_sync_at, user_id FROM sync_meta WHERE id = 1",
                [],
                |row| {
                    Ok(SyncMeta {
                        last_sync_at: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Merge a partial update into the checkpoint, creating it on first use
    pub fn meta_set(&self, update: &SyncMetaUpdate) -> Result<SyncMeta> {
        let mut meta = self.meta_get()?.unwrap_or_default();
        if let Some(last_sync_at) = update.last_sync_at {
            meta.last_sync_at = last_sync_at;
        }
        if let Some(user_id) = &update.user_id {
            meta.user_id.clone_from(user_id);
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (id, last_sync_at, user_id) VALUES (1, ?, ?)",
            params![meta.last_sync_at, meta.user_id],
        )?;
        Ok(meta)
    }

    /// Annotate an entity with its replication state.
    ///
    /// A `None` server id or timestamp keeps the stored value. Returns whether
    /// a record was updated.
    pub fn set_entity_sync_status(
        &self,
        table: SyncTable,
        entity_id: &str,
        status: SyncStatus,
        server_id: Option<&str>,
        synced_at: Option<i64>,
    ) -> Result<bool> {
        let (sql_table, key_filter) = match table {
            SyncTable::Expenses => ("expenses", "id = ?4"),
            SyncTable::Categories => ("categories", "id = ?4"),
            SyncTable::Preferences => ("preferences", "id = 1 AND ?4 IS NOT NULL"),
        };
        let rows = self.conn.execute(
            &format!(
                "UPDATE {sql_table}
                 SET sync_status = ?1,
                     server_id = COALESCE(?2, server_id),
                     synced_at = COALESCE(?3, synced_at)
                 WHERE {key_filter}"
            ),
            params![status.as_str(), server_id, synced_at, entity_id],
        )?;
        Ok(rows > 0)
    }
}
