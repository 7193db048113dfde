//! Pull pipeline: apply remote changes since the last checkpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::store::LocalStore;
use super::SyncError;
use crate::models::{Category, Expense, SyncStatus, SyncTable};
use crate::remote::{RemoteError, RemoteStore};
use crate::util::{datetime_from_millis, unix_millis_now};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PulledCounts {
    pub expenses: usize,
    pub categories: usize,
    pub preferences: usize,
}

impl PulledCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.expenses + self.categories + self.preferences
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullResult {
    pub success: bool,
    /// Remote records written locally, per table
    pub pulled: PulledCounts,
    pub errors: Vec<String>,
    /// Remote rows that failed validation and were skipped
    pub rejected: usize,
    /// Time the pull started; the next checkpoint if the whole cycle succeeds
    pub checkpoint: i64,
}

/// Expenses: the remote copy wins when its server `updated_at` is not older
/// than the local edit. Unknown tombstones are not materialized.
pub fn remote_expense_wins(local: Option<&Expense>, remote: &Expense) -> bool {
    local.map_or(!remote.is_deleted, |local| remote.updated_at >= local.updated_at)
}

/// Categories carry no edit time, so the remote copy wins unless a local edit
/// is still waiting to be pushed.
pub fn remote_category_wins(local: Option<&Category>, remote: &Category) -> bool {
    local.map_or(!remote.is_deleted, |local| {
        local.sync.status != SyncStatus::Pending
    })
}

/// Fetch and apply every table changed since the stored `last_sync_at`.
///
/// Tables fail independently. The checkpoint is not committed here; the
/// orchestrator decides whether the cycle earned it.
pub async fn pull_changes<L, R>(store: &L, remote: &R, user_id: &str) -> PullResult
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    let mut result = PullResult {
        success: true,
        checkpoint: unix_millis_now(),
        ..PullResult::default()
    };

    let since = match store.sync_meta() {
        Ok(meta) => meta
            .and_then(|meta| meta.last_sync_at)
            .and_then(datetime_from_millis),
        Err(error) => {
            result.success = false;
            result.errors.push(format!("Failed to read sync checkpoint: {error}"));
            return result;
        }
    };

    let outcomes = [
        (
            SyncTable::Expenses,
            pull_expenses(store, remote, user_id, since).await,
        ),
        (
            SyncTable::Categories,
            pull_categories(store, remote, user_id, since).await,
        ),
        (
            SyncTable::Preferences,
            pull_preferences(store, remote, user_id, since).await,
        ),
    ];

    for (table, outcome) in outcomes {
        match outcome {
            Ok(TablePull { applied, rejected }) => {
                result.rejected += rejected;
                match table {
                    SyncTable::Expenses => result.pulled.expenses = applied,
                    SyncTable::Categories => result.pulled.categories = applied,
                    SyncTable::Preferences => result.pulled.preferences = applied,
                }
            }
            Err(error) => {
                result.success = false;
                result.errors.push(format!("Failed to pull {table}: {error}"));
            }
        }
    }

    debug!(
        expenses = result.pulled.expenses,
        categories = result.pulled.categories,
        preferences = result.pulled.preferences,
        rejected = result.rejected,
        "Pull finished"
    );
    result
}

/// Per-table outcome. Rejected rows are skipped so one malformed row from
/// another client cannot hold back the rest of the table or the checkpoint.
#[derive(Debug, Default)]
struct TablePull {
    applied: usize,
    rejected: usize,
}

fn reject(table: SyncTable, local_id: &str, error: &RemoteError, outcome: &mut TablePull) {
    warn!(%table, local_id, "Skipping invalid remote row: {error}");
    outcome.rejected += 1;
}

async fn pull_expenses<L, R>(
    store: &L,
    remote: &R,
    user_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<TablePull, SyncError>
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    let rows = remote.fetch_expenses(user_id, since).await?;
    let pulled_at = unix_millis_now();
    let mut outcome = TablePull::default();
    for row in rows {
        let local_id = row.local_id.clone();
        let expense = match row.into_expense(pulled_at) {
            Ok(expense) => expense,
            Err(error) => {
                reject(SyncTable::Expenses, &local_id, &error, &mut outcome);
                continue;
            }
        };
        if store.merge_remote_expense(expense, remote_expense_wins)? {
            outcome.applied += 1;
        }
    }
    Ok(outcome)
}

async fn pull_categories<L, R>(
    store: &L,
    remote: &R,
    user_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<TablePull, SyncError>
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    let rows = remote.fetch_categories(user_id, since).await?;
    let pulled_at = unix_millis_now();
    let mut outcome = TablePull::default();
    for row in rows {
        let local_id = row.local_id.clone();
        let category = match row.into_category(pulled_at) {
            Ok(category) => category,
            Err(error) => {
                reject(SyncTable::Categories, &local_id, &error, &mut outcome);
                continue;
            }
        };
        if store.merge_remote_category(category, remote_category_wins)? {
            outcome.applied += 1;
        }
    }
    Ok(outcome)
}

async fn pull_preferences<L, R>(
    store: &L,
    remote: &R,
    user_id: &str,
    since: Option<DateTime<Utc>>,
) -> Result<TablePull, SyncError>
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    let row = match remote.fetch_preferences(user_id, since).await {
        Ok(Some(row)) => row,
        Ok(None) | Err(RemoteError::NotFound) => return Ok(TablePull::default()),
        Err(error) => return Err(error.into()),
    };
    let mut outcome = TablePull::default();
    match row.into_preferences(unix_millis_now()) {
        Ok(preferences) => {
            store.merge_remote_preferences(preferences)?;
            outcome.applied = 1;
        }
        Err(error) => reject(SyncTable::Preferences, user_id, &error, &mut outcome),
    }
    Ok(outcome)
}
