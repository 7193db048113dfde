//! Sync bookkeeping models: per-entity metadata, queued actions, and the
//! global checkpoint record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ActionId;

/// Snapshot of entity fields carried by a queued action
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Per-entity replication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes not yet acknowledged by the remote store
    #[default]
    Pending,
    /// Local record matches the last acknowledged remote state
    Synced,
    /// Last transmission attempt failed permanently
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// Sync annotations attached to every entity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncMetadata {
    pub status: SyncStatus,
    /// Remote-assigned identifier, set after the first acknowledged push
    pub server_id: Option<String>,
    /// Unix ms of the last acknowledged push or applied pull
    pub synced_at: Option<i64>,
}

impl SyncMetadata {
    /// Metadata for a record that was just written locally
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: SyncStatus::Pending,
            server_id: None,
            synced_at: None,
        }
    }

    /// Metadata for a record that mirrors a remote row
    #[must_use]
    pub const fn synced(server_id: String, synced_at: i64) -> Self {
        Self {
            status: SyncStatus::Synced,
            server_id: Some(server_id),
            synced_at: Some(synced_at),
        }
    }
}

/// Tables that participate in replication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTable {
    Expenses,
    Categories,
    Preferences,
}

impl SyncTable {
    pub const ALL: [Self; 3] = [Self::Expenses, Self::Categories, Self::Preferences];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expenses => "expenses",
            Self::Categories => "categories",
            Self::Preferences => "preferences",
        }
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expenses" => Ok(Self::Expenses),
            "categories" => Ok(Self::Categories),
            "preferences" => Ok(Self::Preferences),
            other => Err(format!("unknown sync table '{other}'")),
        }
    }
}

/// Mutation kind recorded in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown sync operation '{other}'")),
        }
    }
}

/// A pending mutation awaiting transmission.
///
/// The queue holds at most one action per `(table, entity_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: ActionId,
    pub table: SyncTable,
    pub operation: SyncOperation,
    pub entity_id: String,
    pub payload: Payload,
    /// Unix ms of the last enqueue that touched this action
    pub timestamp: i64,
    pub retry_count: u32,
}

impl SyncAction {
    /// Create a fresh action with no retries recorded
    #[must_use]
    pub fn new(
        table: SyncTable,
        operation: SyncOperation,
        entity_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: ActionId::new(),
            table,
            operation,
            entity_id: entity_id.into(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
        }
    }
}

/// Partial update applied to a queued action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueItemUpdate {
    pub operation: Option<SyncOperation>,
    pub payload: Option<Payload>,
    pub timestamp: Option<i64>,
    pub retry_count: Option<u32>,
}

/// Global sync checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncMeta {
    /// High-water mark (Unix ms) of the last fully successful cycle
    pub last_sync_at: Option<i64>,
    /// User the local data was last synced for
    pub user_id: Option<String>,
}

/// Partial update applied to [`SyncMeta`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMetaUpdate {
    pub last_sync_at: Option<Option<i64>>,
    pub user_id: Option<Option<String>>,
}

impl SyncMetaUpdate {
    /// Reset both fields to null
    #[must_use]
    pub const fn reset() -> Self {
        Self {
            last_sync_at: Some(None),
            user_id: Some(None),
        }
    }
}
