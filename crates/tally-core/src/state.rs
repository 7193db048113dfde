//! Sync status shared with UI layers.

use serde::Serialize;

/// Coarse sync state shown next to the pending count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// What the orchestrator publishes after every cycle and store refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub pending_count: usize,
    /// Unix ms of the last fully successful cycle
    pub last_sync_at: Option<i64>,
    pub last_error: Option<String>,
}

impl SyncSnapshot {
    #[must_use]
    pub const fn has_pending_changes(&self) -> bool {
        self.pending_count > 0
    }
}
