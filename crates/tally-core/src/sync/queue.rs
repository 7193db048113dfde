//! Merge-on-enqueue rules and retry bookkeeping for the outbound queue.
//!
//! The queue holds at most one action per `(table, entity_id)`. A new
//! mutation for an entity that already has a pending action is folded into
//! that action instead of appended:
//!
//! | pending  | incoming | result                                   |
//! |----------|----------|------------------------------------------|
//! | none     | any      | append, `retry_count = 0`                |
//! | `create` | `delete` | drop the pending action, send nothing    |
//! | other    | `delete` | becomes `delete` with the new payload    |
//! | not del. | `update` | payload merged field by field, op kept   |
//! | `delete` | `update` | ignored                                  |
//! | not del. | `create` | treated like `update`                    |

use tracing::warn;

use super::store::LocalStore;
use crate::models::{ActionId, Payload, QueueItemUpdate, SyncAction, SyncOperation, SyncTable};
use crate::Result;

/// Failed transmissions allowed before an action is dropped
pub const MAX_RETRIES: u32 = 3;

/// What enqueueing a mutation did to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new action was appended
    Appended,
    /// The pending action absorbed the mutation
    Merged,
    /// A pending `create` was cancelled by a `delete`
    Cancelled,
    /// The mutation was dropped (update after delete)
    Ignored,
}

/// Storage step needed to apply a mutation to the queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueuePlan {
    Append(SyncAction),
    Update(SyncAction, QueueItemUpdate),
    Remove(SyncAction),
    Nothing,
}

impl QueuePlan {
    #[must_use]
    pub const fn outcome(&self) -> EnqueueOutcome {
        match self {
            Self::Append(_) => EnqueueOutcome::Appended,
            Self::Update(..) => EnqueueOutcome::Merged,
            Self::Remove(_) => EnqueueOutcome::Cancelled,
            Self::Nothing => EnqueueOutcome::Ignored,
        }
    }
}

/// Decide how a mutation folds into the pending action for its entity.
///
/// `now` becomes the timestamp of an appended action; a merged action is
/// refreshed to `now` or, if that would not move it forward, one past its
/// previous timestamp.
#[must_use]
pub fn plan_enqueue(
    existing: Option<&SyncAction>,
    table: SyncTable,
    operation: SyncOperation,
    entity_id: &str,
    payload: Payload,
    now: i64,
) -> QueuePlan {
    let Some(existing) = existing else {
        let mut action = SyncAction::new(table, operation, entity_id, payload);
        action.timestamp = now;
        return QueuePlan::Append(action);
    };
    // A merged action must always look touched to an in-flight push
    let touched_at = now.max(existing.timestamp.saturating_add(1));

    match (existing.operation, operation) {
        (SyncOperation::Create, SyncOperation::Delete) => QueuePlan::Remove(existing.clone()),
        (_, SyncOperation::Delete) => QueuePlan::Update(
            existing.clone(),
            QueueItemUpdate {
                operation: Some(SyncOperation::Delete),
                payload: Some(payload),
                timestamp: Some(touched_at),
                retry_count: None,
            },
        ),
        (SyncOperation::Delete, _) => QueuePlan::Nothing,
        (_, SyncOperation::Update | SyncOperation::Create) => {
            let mut merged = existing.payload.clone();
            merged.extend(payload);
            QueuePlan::Update(
                existing.clone(),
                QueueItemUpdate {
                    operation: None,
                    payload: Some(merged),
                    timestamp: Some(touched_at),
                    retry_count: None,
                },
            )
        }
    }
}

/// Result of recording one failed transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the action queued with the new retry count
    Retry(u32),
    /// Ceiling reached; drop the action and report a permanent failure
    Exhausted,
}

/// Bookkeeping for `mark_action_failed`
#[must_use]
pub const fn next_retry(retry_count: u32) -> RetryDecision {
    let attempts = retry_count.saturating_add(1);
    if attempts >= MAX_RETRIES {
        RetryDecision::Exhausted
    } else {
        RetryDecision::Retry(attempts)
    }
}

/// Record a failed transmission for a queued action.
///
/// Returns `None` when the action is no longer queued (cancelled while the
/// transmission was in flight).
pub fn mark_action_failed<L: LocalStore + ?Sized>(
    store: &L,
    id: &ActionId,
) -> Result<Option<RetryDecision>> {
    let Some(action) = store.queue_item(id)? else {
        return Ok(None);
    };

    let decision = next_retry(action.retry_count);
    match decision {
        RetryDecision::Retry(retry_count) => {
            store.update_queue_item(
                id,
                QueueItemUpdate {
                    retry_count: Some(retry_count),
                    ..QueueItemUpdate::default()
                },
            )?;
        }
        RetryDecision::Exhausted => {
            warn!(
                table = %action.table,
                entity_id = %action.entity_id,
                "Dropping sync action after {MAX_RETRIES} failed attempts"
            );
            store.remove_from_queue(id)?;
        }
    }
    Ok(Some(decision))
}
