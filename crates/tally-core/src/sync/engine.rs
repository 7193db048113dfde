//! Sync orchestrator: push then pull, checkpoint bookkeeping, and the
//! login/logout lifecycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::pull::{pull_changes, PulledCounts};
use super::push::push_changes;
use super::store::LocalStore;
use crate::models::SyncMetaUpdate;
use crate::remote::RemoteStore;
use crate::state::{SyncSnapshot, SyncState};

pub const ALREADY_SYNCING: &str = "Sync already in progress";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    /// The request was refused because a cycle for the same user is running
    pub skipped: bool,
    pub pushed: usize,
    pub failed: usize,
    pub pulled: PulledCounts,
    pub errors: Vec<String>,
    /// Checkpoint after the cycle, committed or not
    pub last_sync_at: Option<i64>,
}

impl SyncResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            errors: vec![ALREADY_SYNCING.to_string()],
            ..Self::default()
        }
    }

    fn local_failure(context: &str, error: &crate::Error) -> Self {
        Self {
            errors: vec![format!("{context}: {error}")],
            ..Self::default()
        }
    }
}

/// Removes the user from the in-flight set when the cycle ends, however it ends.
struct InFlight<'a> {
    users: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

/// Runs sync cycles against an injected local store and remote store.
pub struct SyncEngine<L, R> {
    store: Arc<L>,
    remote: Arc<R>,
    in_flight: Mutex<HashSet<String>>,
    status: watch::Sender<SyncSnapshot>,
}

impl<L, R> std::fmt::Debug for SyncEngine<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<L, R> SyncEngine<L, R>
where
    L: LocalStore,
    R: RemoteStore,
{
    pub fn new(store: Arc<L>, remote: Arc<R>) -> Self {
        let pending_count = store.queue_count().unwrap_or_else(|error| {
            warn!("Failed to read sync queue size: {error}");
            0
        });
        let last_sync_at = match store.sync_meta() {
            Ok(meta) => meta.and_then(|meta| meta.last_sync_at),
            Err(error) => {
                warn!("Failed to read sync checkpoint: {error}");
                None
            }
        };
        let initial = SyncSnapshot {
            pending_count,
            last_sync_at,
            ..SyncSnapshot::default()
        };
        let (status, _) = watch::channel(initial);
        Self {
            store,
            remote,
            in_flight: Mutex::new(HashSet::new()),
            status,
        }
    }

    pub const fn store(&self) -> &Arc<L> {
        &self.store
    }

    pub const fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    fn begin(&self, user_id: &str) -> Option<InFlight<'_>> {
        let mut users = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !users.insert(user_id.to_string()) {
            return None;
        }
        Some(InFlight {
            users: &self.in_flight,
            user_id: user_id.to_string(),
        })
    }

    /// Push the queue, then pull remote changes.
    ///
    /// The pull runs even when the push reported failures. The checkpoint only
    /// advances when both phases succeed, and never moves backwards.
    pub async fn sync(&self, user_id: &str) -> SyncResult {
        let Some(_guard) = self.begin(user_id) else {
            warn!(user_id, "{ALREADY_SYNCING}; skipping");
            return SyncResult::skipped();
        };
        self.status.send_modify(|status| status.state = SyncState::Syncing);

        let push = push_changes(self.store.as_ref(), self.remote.as_ref(), user_id).await;
        let pull = pull_changes(self.store.as_ref(), self.remote.as_ref(), user_id).await;

        let mut result = SyncResult {
            success: push.success && pull.success,
            skipped: false,
            pushed: push.pushed,
            failed: push.failed,
            pulled: pull.pulled,
            errors: push.errors.into_iter().chain(pull.errors).collect(),
            last_sync_at: None,
        };

        if result.success {
            match self.commit_checkpoint(user_id, pull.checkpoint) {
                Ok(last_sync_at) => result.last_sync_at = Some(last_sync_at),
                Err(error) => {
                    result.success = false;
                    result
                        .errors
                        .push(format!("Failed to record sync checkpoint: {error}"));
                }
            }
        }
        if result.last_sync_at.is_none() {
            result.last_sync_at = self.last_sync_time().ok().flatten();
        }

        info!(
            user_id,
            success = result.success,
            pushed = result.pushed,
            failed = result.failed,
            pulled = result.pulled.total(),
            "Sync cycle finished"
        );
        self.publish(&result);
        result
    }

    fn commit_checkpoint(&self, user_id: &str, checkpoint: i64) -> crate::Result<i64> {
        let previous = self
            .store
            .sync_meta()?
            .and_then(|meta| meta.last_sync_at);
        let last_sync_at = previous.map_or(checkpoint, |previous| previous.max(checkpoint));
        self.store.set_sync_meta(SyncMetaUpdate {
            last_sync_at: Some(Some(last_sync_at)),
            user_id: Some(Some(user_id.to_string())),
        })?;
        Ok(last_sync_at)
    }

    /// First sync after a login: queue everything that never reached the
    /// remote store, then run one cycle.
    pub async fn initialize_sync(&self, user_id: &str) -> SyncResult {
        match self.adopt_local_data(user_id) {
            Ok(marked) => info!(user_id, marked, "Queued local-only records for first sync"),
            Err(error) => {
                let result = SyncResult::local_failure("Failed to prepare local data", &error);
                self.publish(&result);
                return result;
            }
        }
        self.sync(user_id).await
    }

    fn adopt_local_data(&self, user_id: &str) -> crate::Result<usize> {
        let previous_user = self.store.sync_meta()?.and_then(|meta| meta.user_id);
        if previous_user.as_deref() != Some(user_id) {
            // Checkpoints are per account
            self.store.set_sync_meta(SyncMetaUpdate {
                last_sync_at: Some(None),
                user_id: Some(Some(user_id.to_string())),
            })?;
        }
        self.store.mark_all_local_entities_pending()
    }

    /// Logout: drop queued actions and the checkpoint. Entity data stays.
    pub fn clear_sync_state(&self) -> crate::Result<()> {
        self.store.clear_queue()?;
        self.store.set_sync_meta(SyncMetaUpdate::reset())?;
        self.status.send_replace(SyncSnapshot::default());
        info!("Cleared sync state");
        Ok(())
    }

    pub fn has_pending_changes(&self) -> crate::Result<bool> {
        Ok(self.queue_count()? > 0)
    }

    pub fn last_sync_time(&self) -> crate::Result<Option<i64>> {
        Ok(self.store.sync_meta()?.and_then(|meta| meta.last_sync_at))
    }

    pub fn queue_count(&self) -> crate::Result<usize> {
        self.store.queue_count()
    }

    pub fn status(&self) -> SyncSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncSnapshot> {
        self.status.subscribe()
    }

    /// Re-read the pending count and checkpoint after a local write.
    pub fn refresh_status(&self) {
        let pending_count = self.store.queue_count();
        let last_sync_at = self.last_sync_time();
        self.status.send_if_modified(|status| {
            let before = status.clone();
            if let Ok(count) = pending_count {
                status.pending_count = count;
            }
            if let Ok(last_sync_at) = last_sync_at {
                status.last_sync_at = last_sync_at;
            }
            *status != before
        });
    }

    fn publish(&self, result: &SyncResult) {
        let pending_count = self.store.queue_count().ok();
        self.status.send_modify(|status| {
            status.state = if result.success {
                SyncState::Synced
            } else {
                SyncState::Error
            };
            if let Some(count) = pending_count {
                status.pending_count = count;
            }
            status.last_sync_at = result.last_sync_at;
            status.last_error = result.errors.last().cloned();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CategoryId, ExpenseId, NewExpense, PreferencesUpdate, SyncStatus, SyncTable, ThemeMode,
    };
    use crate::remote::memory::MemoryRemoteStore;
    use crate::remote::ExpenseRow;
    use crate::services::DatabaseService;
    use crate::sync::pull_changes;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const USER: &str = "user-1";

    type Engine = SyncEngine<DatabaseService, MemoryRemoteStore>;

    fn engine() -> Engine {
        SyncEngine::new(
            Arc::new(DatabaseService::open_in_memory().unwrap()),
            Arc::new(MemoryRemoteStore::new()),
        )
    }

    fn first_category(engine: &Engine) -> CategoryId {
        engine.store().list_categories(false).unwrap()[0].id
    }

    fn new_expense(category_id: CategoryId, description: &str) -> NewExpense {
        NewExpense {
            amount: dec!(12.40),
            currency: "USD".to_string(),
            category_id,
            description: description.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 9).unwrap(),
            is_recurring: false,
            recurring_frequency: None,
        }
    }

    #[tokio::test]
    async fn successful_cycle_pushes_pulls_and_records_checkpoint() {
        let engine = engine();
        let category = first_category(&engine);
        engine
            .store()
            .create_expense(new_expense(category, "Lunch"))
            .unwrap();

        let result = engine.sync(USER).await;

        assert!(result.success, "{:?}", result.errors);
        assert!(!result.skipped);
        assert_eq!(result.pushed, 1);
        assert!(result.last_sync_at.is_some());
        assert_eq!(engine.last_sync_time().unwrap(), result.last_sync_at);
        assert!(!engine.has_pending_changes().unwrap());

        let meta = engine.store().sync_meta().unwrap().unwrap();
        assert_eq!(meta.user_id.as_deref(), Some(USER));
    }

    #[test]
    fn unreadable_store_starts_with_an_empty_snapshot() {
        let store = DatabaseService::open_in_memory().unwrap();
        store.poison();
        assert!(store.queue_count().is_err());

        let engine = SyncEngine::new(Arc::new(store), Arc::new(MemoryRemoteStore::new()));
        assert_eq!(engine.status(), SyncSnapshot::default());
    }

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let engine = engine();
        let future = chrono::Utc::now().timestamp_millis() + 3_600_000;
        engine
            .store()
            .set_sync_meta(SyncMetaUpdate {
                last_sync_at: Some(Some(future)),
                user_id: Some(Some(USER.to_string())),
            })
            .unwrap();

        let result = engine.sync(USER).await;

        assert!(result.success);
        assert_eq!(result.last_sync_at, Some(future));
        assert_eq!(engine.last_sync_time().unwrap(), Some(future));
    }

    #[tokio::test]
    async fn failed_cycle_leaves_checkpoint_unchanged() {
        let engine = engine();
        engine.sync(USER).await;
        let before = engine.last_sync_time().unwrap();
        assert!(before.is_some());

        engine.remote().fail_fetches(SyncTable::Categories, true);
        let result = engine.sync(USER).await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.last_sync_at, before);
        assert_eq!(engine.last_sync_time().unwrap(), before);
        assert_eq!(engine.status().state, SyncState::Error);
        assert!(engine.status().last_error.is_some());
    }

    #[tokio::test]
    async fn pull_runs_even_when_push_fails() {
        let engine = engine();
        let category = first_category(&engine);
        let expense = engine
            .store()
            .create_expense(new_expense(category, "Coffee"))
            .unwrap();
        let mut row = ExpenseRow::from_expense(USER, &expense).unwrap();
        row.local_id = ExpenseId::new().as_str();
        engine.remote().seed_expense(row);
        engine.remote().fail_writes(1);

        let result = engine.sync(USER).await;

        assert_eq!(result.pushed, 0);
        assert_eq!(result.pulled.expenses, 1);
        assert!(engine.has_pending_changes().unwrap());
    }

    #[tokio::test]
    async fn overlapping_sync_for_same_user_is_refused() {
        let engine = engine();
        let guard = engine.begin(USER).unwrap();

        let result = engine.sync(USER).await;
        assert!(result.skipped);
        assert!(!result.success);
        assert_eq!(result.errors, vec![ALREADY_SYNCING.to_string()]);
        assert_eq!(engine.remote().fetch_calls(), 0);

        let other = engine.sync("user-2").await;
        assert!(!other.skipped);

        drop(guard);
        assert!(!engine.sync(USER).await.skipped);
    }

    #[tokio::test]
    async fn initialize_sync_pushes_data_created_before_login() {
        let engine = engine();
        let category = first_category(&engine);
        let expense = engine
            .store()
            .create_expense(new_expense(category, "Groceries"))
            .unwrap();
        engine.store().clear_queue().unwrap();

        let result = engine.initialize_sync(USER).await;

        assert!(result.success, "{:?}", result.errors);
        assert!(engine
            .remote()
            .expense(USER, &expense.id.as_str())
            .is_some());
        let local = engine.store().get_expense(&expense.id).unwrap().unwrap();
        assert_eq!(local.sync.status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn initialize_sync_for_new_user_resets_checkpoint() {
        let engine = engine();
        let category = first_category(&engine);
        let expense = engine
            .store()
            .create_expense(new_expense(category, "Old remote row"))
            .unwrap();
        let mut row = ExpenseRow::from_expense(USER, &expense).unwrap();
        row.local_id = ExpenseId::new().as_str();
        row.updated_at = chrono::DateTime::from_timestamp_millis(1_000);
        engine.remote().seed_expense(row);

        assert!(engine.sync("previous-user").await.success);
        engine.store().clear_queue().unwrap();

        let result = engine.initialize_sync(USER).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.pulled.expenses, 1);
        let meta = engine.store().sync_meta().unwrap().unwrap();
        assert_eq!(meta.user_id.as_deref(), Some(USER));
    }

    #[tokio::test]
    async fn clear_sync_state_keeps_entities() {
        let engine = engine();
        let category = first_category(&engine);
        let expense = engine
            .store()
            .create_expense(new_expense(category, "Books"))
            .unwrap();
        engine.sync(USER).await;
        engine
            .store()
            .delete_expense(&expense.id)
            .unwrap();

        engine.clear_sync_state().unwrap();

        assert_eq!(engine.queue_count().unwrap(), 0);
        assert_eq!(engine.last_sync_time().unwrap(), None);
        assert_eq!(engine.store().sync_meta().unwrap().unwrap().user_id, None);
        let kept = engine.store().get_expense_any(&expense.id).unwrap().unwrap();
        assert!(kept.is_deleted);
        assert_eq!(engine.status(), SyncSnapshot::default());
    }

    #[tokio::test]
    async fn status_channel_tracks_pending_and_last_sync() {
        let engine = engine();
        let mut status = engine.subscribe_status();
        let category = first_category(&engine);

        engine
            .store()
            .create_expense(new_expense(category, "Parking"))
            .unwrap();
        engine.refresh_status();
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().pending_count, 1);

        engine.sync(USER).await;
        let snapshot = status.borrow_and_update().clone();
        assert_eq!(snapshot.state, SyncState::Synced);
        assert_eq!(snapshot.pending_count, 0);
        assert!(snapshot.last_sync_at.is_some());
        assert!(!snapshot.has_pending_changes());
    }

    #[tokio::test]
    async fn expense_in_default_category_resolves_on_another_device() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let first = SyncEngine::new(
            Arc::new(DatabaseService::open_in_memory().unwrap()),
            Arc::clone(&remote),
        );
        let second = SyncEngine::new(
            Arc::new(DatabaseService::open_in_memory().unwrap()),
            Arc::clone(&remote),
        );

        let category = first_category(&first);
        let expense = first
            .store()
            .create_expense(new_expense(category, "Dinner"))
            .unwrap();
        assert!(first.sync(USER).await.success);

        let result = second.sync(USER).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.pulled.expenses, 1);
        let pulled = second.store().get_expense(&expense.id).unwrap().unwrap();
        let resolved = second.store().get_category(&pulled.category_id).unwrap();
        assert_eq!(resolved.map(|category| category.name), Some("Food & Dining".to_string()));
    }

    #[tokio::test]
    async fn preferences_from_first_device_overwrite_second() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let first = SyncEngine::new(
            Arc::new(DatabaseService::open_in_memory().unwrap()),
            Arc::clone(&remote),
        );
        let second = DatabaseService::open_in_memory().unwrap();

        first
            .store()
            .update_preferences(PreferencesUpdate {
                theme: Some(ThemeMode::Dark),
                default_currency: Some("EUR".to_string()),
                ..PreferencesUpdate::default()
            })
            .unwrap();
        assert!(first.sync(USER).await.success);

        second
            .update_preferences(PreferencesUpdate {
                theme: Some(ThemeMode::Light),
                default_currency: Some("JPY".to_string()),
                ..PreferencesUpdate::default()
            })
            .unwrap();
        let pulled = pull_changes(&second, remote.as_ref(), USER).await;

        assert!(pulled.success);
        assert_eq!(pulled.pulled.preferences, 1);
        let preferences = second.preferences().unwrap();
        assert_eq!(preferences.theme, ThemeMode::Dark);
        assert_eq!(preferences.default_currency, "EUR");
    }
}
