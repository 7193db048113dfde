//! Remote store access: the transport contract, typed rows, and the Supabase
//! (PostgREST) implementation.

#[cfg(test)]
pub(crate) mod memory;
mod rows;
mod supabase;

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::SyncTable;

pub use rows::{remote_table_name, CategoryRow, ExpenseRow, PreferencesRow, RemoteRecord};
pub use supabase::SupabaseRemoteStore;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Remote row not found")]
    NotFound,
    #[error("Invalid remote row: {0}")]
    InvalidRow(String),
    #[error("Unsupported remote operation: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidRow(error.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Tenant-scoped remote store.
///
/// Writes are idempotent upserts keyed by `(user_id, local_id)` (`user_id`
/// alone for preferences); deletes are timestamped tombstones. `updated_at`
/// is maintained by the server.
pub trait RemoteStore: Send + Sync {
    /// Returns the server-assigned row id
    fn upsert_expense(&self, row: &ExpenseRow)
        -> impl Future<Output = RemoteResult<String>> + Send;

    fn upsert_category(
        &self,
        row: &CategoryRow,
    ) -> impl Future<Output = RemoteResult<String>> + Send;

    fn upsert_preferences(
        &self,
        row: &PreferencesRow,
    ) -> impl Future<Output = RemoteResult<String>> + Send;

    fn soft_delete(
        &self,
        table: SyncTable,
        user_id: &str,
        local_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Rows owned by `user_id`, changed strictly after `since` when given
    fn fetch_expenses(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RemoteResult<Vec<ExpenseRow>>> + Send;

    fn fetch_categories(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RemoteResult<Vec<CategoryRow>>> + Send;

    /// `Ok(None)` when the user has no preferences row (or none newer than `since`)
    fn fetch_preferences(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = RemoteResult<Option<PreferencesRow>>> + Send;
}
