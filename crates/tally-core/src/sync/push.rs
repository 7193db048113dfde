//! Push pipeline: drain the queue to the remote store, one action at a time.

use serde::Serialize;
use tracing::{debug, warn};

use super::queue::{mark_action_failed, RetryDecision, MAX_RETRIES};
use super::store::LocalStore;
use crate::models::{SyncAction, SyncOperation, SyncStatus};
use crate::remote::{RemoteError, RemoteRecord, RemoteStore};
use crate::util::datetime_from_millis;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub success: bool,
    /// Actions acknowledged by the remote store
    pub pushed: usize,
    /// Actions dropped after exhausting their retries
    pub failed: usize,
    pub errors: Vec<String>,
}

impl PushResult {
    fn fail(&mut self, error: String) {
        self.success = false;
        self.errors.push(error);
    }
}

/// Transmit every action queued at call time, in enqueue order.
///
/// Actions enqueued while the push runs wait for the next cycle. A failed
/// transmission stays queued until it has failed [`MAX_RETRIES`] times.
pub async fn push_changes<L, R>(store: &L, remote: &R, user_id: &str) -> PushResult
where
    L: LocalStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    let mut result = PushResult {
        success: true,
        ..PushResult::default()
    };

    let snapshot = match store.sync_queue_all() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            result.fail(format!("Failed to read sync queue: {error}"));
            return result;
        }
    };

    for queued in snapshot {
        // Re-read so merges since the snapshot are sent; skip cancelled actions
        let action = match store.queue_item(&queued.id) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(error) => {
                result.fail(format!(
                    "Failed to read {}/{}: {error}",
                    queued.table, queued.entity_id
                ));
                continue;
            }
        };

        debug!(
            table = %action.table,
            operation = %action.operation,
            entity_id = %action.entity_id,
            "Pushing sync action"
        );

        match transmit(remote, user_id, &action).await {
            Ok(server_id) => {
                if let Err(error) = acknowledge(store, &action, server_id.as_deref()) {
                    result.fail(format!(
                        "Pushed {}/{} but failed to record it: {error}",
                        action.table, action.entity_id
                    ));
                } else {
                    result.pushed += 1;
                }
            }
            Err(error) => record_failure(store, &action, &error, &mut result),
        }
    }

    result
}

async fn transmit<R>(
    remote: &R,
    user_id: &str,
    action: &SyncAction,
) -> Result<Option<String>, RemoteError>
where
    R: RemoteStore + ?Sized,
{
    if action.operation == SyncOperation::Delete {
        let deleted_at = action
            .payload
            .get("deleted_at")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(action.timestamp);
        let deleted_at = datetime_from_millis(deleted_at)
            .ok_or_else(|| RemoteError::InvalidRow(format!("bad tombstone time {deleted_at}")))?;
        remote
            .soft_delete(action.table, user_id, &action.entity_id, deleted_at)
            .await?;
        return Ok(None);
    }

    let server_id = match RemoteRecord::from_action(user_id, action)? {
        RemoteRecord::Expenses(row) => remote.upsert_expense(&row).await?,
        RemoteRecord::Categories(row) => remote.upsert_category(&row).await?,
        RemoteRecord::UserPreferences(row) => remote.upsert_preferences(&row).await?,
    };
    Ok(Some(server_id))
}

fn acknowledge<L>(store: &L, action: &SyncAction, server_id: Option<&str>) -> crate::Result<()>
where
    L: LocalStore + ?Sized,
{
    // A merge during transmission leaves the action queued and the entity pending
    let status = if store.acknowledge_action(action)? {
        SyncStatus::Synced
    } else {
        debug!(
            table = %action.table,
            entity_id = %action.entity_id,
            "Action changed during push; keeping it queued"
        );
        SyncStatus::Pending
    };
    store.upsert_entity_sync_status(action.table, &action.entity_id, status, server_id)?;
    Ok(())
}

fn record_failure<L>(store: &L, action: &SyncAction, error: &RemoteError, result: &mut PushResult)
where
    L: LocalStore + ?Sized,
{
    let label = format!("{}/{}", action.table, action.entity_id);
    match mark_action_failed(store, &action.id) {
        Ok(Some(RetryDecision::Retry(attempts))) => {
            warn!("Push of {label} failed (attempt {attempts} of {MAX_RETRIES}): {error}");
        }
        Ok(Some(RetryDecision::Exhausted)) => {
            result.failed += 1;
            result.fail(format!(
                "Failed to sync {label} after {MAX_RETRIES} attempts: {error}"
            ));
            if let Err(status_error) = store.upsert_entity_sync_status(
                action.table,
                &action.entity_id,
                SyncStatus::Error,
                None,
            ) {
                warn!("Failed to flag {label} as errored: {status_error}");
            }
        }
        Ok(None) => debug!("Push of {label} failed after it left the queue: {error}"),
        Err(local) => result.fail(format!("Failed to record retry for {label}: {local}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryId, ExpenseUpdate, NewExpense, PreferencesUpdate, SyncTable};
    use crate::remote::memory::MemoryRemoteStore;
    use crate::services::DatabaseService;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const USER: &str = "user-1";

    fn new_expense(category_id: CategoryId) -> NewExpense {
        NewExpense {
            amount: dec!(8.75),
            currency: "USD".to_string(),
            category_id,
            description: "Taxi".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            is_recurring: false,
            recurring_frequency: None,
        }
    }

    fn setup() -> (DatabaseService, MemoryRemoteStore, CategoryId) {
        let store = DatabaseService::open_in_memory().unwrap();
        let category = store.list_categories(false).unwrap()[0].id;
        (store, MemoryRemoteStore::new(), category)
    }

    #[tokio::test]
    async fn offline_create_is_pushed_and_marked_synced() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        assert_eq!(store.queue_count().unwrap(), 1);

        let result = push_changes(&store, &remote, USER).await;
        assert!(result.success);
        assert_eq!(result.pushed, 1);
        assert_eq!(store.queue_count().unwrap(), 0);

        let local = store.get_expense(&expense.id).unwrap().unwrap();
        assert_eq!(local.sync.status, SyncStatus::Synced);
        let row = remote.expense(USER, &expense.id.as_str()).unwrap();
        assert_eq!(local.sync.server_id, row.id);
        assert_eq!(row.local_id, expense.id.as_str());
    }

    #[tokio::test]
    async fn create_then_delete_makes_no_network_calls() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        store.delete_expense(&expense.id).unwrap();

        let result = push_changes(&store, &remote, USER).await;
        assert!(result.success);
        assert_eq!(result.pushed, 0);
        assert_eq!(remote.write_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_push_keeps_one_remote_row() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        let action = store.sync_queue_all().unwrap().remove(0);

        let first = transmit(&remote, USER, &action).await.unwrap();
        let second = transmit(&remote, USER, &action).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.expense_count(), 1);
        assert_eq!(
            remote.expense(USER, &expense.id.as_str()).unwrap().amount,
            dec!(8.75)
        );
    }

    #[tokio::test]
    async fn delete_after_sync_sends_tombstone() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        push_changes(&store, &remote, USER).await;

        store.delete_expense(&expense.id).unwrap();
        let result = push_changes(&store, &remote, USER).await;

        assert!(result.success);
        assert_eq!(result.pushed, 1);
        assert!(remote
            .expense(USER, &expense.id.as_str())
            .unwrap()
            .deleted_at
            .is_some());
    }

    #[tokio::test]
    async fn three_failures_drop_the_action() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        remote.fail_writes(3);

        for attempt in 1..=2 {
            let result = push_changes(&store, &remote, USER).await;
            assert!(result.success, "attempt {attempt} should only be retried");
            assert_eq!(result.failed, 0);
            assert_eq!(store.sync_queue_all().unwrap()[0].retry_count, attempt);
        }

        let result = push_changes(&store, &remote, USER).await;
        assert!(!result.success);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains(&expense.id.as_str()));
        assert_eq!(store.queue_count().unwrap(), 0);
        assert_eq!(
            store.get_expense(&expense.id).unwrap().unwrap().sync.status,
            SyncStatus::Error
        );
    }

    #[tokio::test]
    async fn two_failures_then_success_is_not_reported() {
        let (store, remote, category) = setup();
        store.create_expense(new_expense(category)).unwrap();
        remote.fail_writes(2);

        push_changes(&store, &remote, USER).await;
        push_changes(&store, &remote, USER).await;
        let result = push_changes(&store, &remote, USER).await;

        assert!(result.success);
        assert_eq!(result.pushed, 1);
        assert_eq!(result.failed, 0);
        assert!(result.errors.is_empty());
        assert_eq!(store.queue_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_on_one_action_does_not_halt_the_rest() {
        let (store, remote, category) = setup();
        store.create_expense(new_expense(category)).unwrap();
        store
            .update_preferences(PreferencesUpdate {
                default_currency: Some("EUR".to_string()),
                ..PreferencesUpdate::default()
            })
            .unwrap();
        remote.fail_writes(1);

        let result = push_changes(&store, &remote, USER).await;
        assert_eq!(result.pushed, 1);
        assert_eq!(store.queue_count().unwrap(), 1);
        assert_eq!(remote.preferences(USER).unwrap().default_currency, "EUR");
    }

    #[tokio::test]
    async fn updates_queued_after_push_wait_for_next_cycle() {
        let (store, remote, category) = setup();
        let expense = store.create_expense(new_expense(category)).unwrap();
        push_changes(&store, &remote, USER).await;

        store
            .update_expense(
                &expense.id,
                ExpenseUpdate {
                    description: Some("Night taxi".to_string()),
                    ..ExpenseUpdate::default()
                },
            )
            .unwrap();
        let action = store.sync_queue_all().unwrap().remove(0);
        assert_eq!(action.table, SyncTable::Expenses);
        assert_eq!(action.operation, SyncOperation::Update);

        push_changes(&store, &remote, USER).await;
        assert_eq!(
            remote.expense(USER, &expense.id.as_str()).unwrap().description,
            "Night taxi"
        );
    }
}
