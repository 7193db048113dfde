//! Offline sync: queue, push, pull, and the orchestrator that runs them.
//!
//! Every local mutation enqueues a [`SyncAction`](crate::models::SyncAction)
//! in the same transaction as the entity write. A sync cycle pushes the queue
//! to the remote store, then pulls remote changes since the last checkpoint
//! and resolves conflicts per table.

mod engine;
mod pull;
mod push;
mod queue;
mod scheduler;
mod store;

pub use engine::{SyncEngine, SyncResult};
pub use pull::{
    pull_changes, remote_category_wins, remote_expense_wins, PullResult, PulledCounts,
};
pub use push::{push_changes, PushResult};
pub use queue::{
    mark_action_failed, next_retry, plan_enqueue, EnqueueOutcome, QueuePlan, RetryDecision,
    MAX_RETRIES,
};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use store::{ConflictRule, LocalStore};

use crate::remote::RemoteError;

/// Failure of one pipeline step; folded into result objects by the callers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Local(#[from] crate::Error),
}
