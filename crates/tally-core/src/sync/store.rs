//! The local store contract consumed by the sync pipelines.

use crate::models::{
    ActionId, Category, Expense, Payload, Preferences, QueueItemUpdate, SyncAction, SyncMeta,
    SyncMetaUpdate, SyncOperation, SyncStatus, SyncTable,
};
use crate::Result;

use super::queue::EnqueueOutcome;

/// Decides whether a remote record replaces the local one (`None` when the
/// entity is unknown locally).
pub type ConflictRule<T> = fn(Option<&T>, &T) -> bool;

/// Persistence operations the sync layer needs.
///
/// Every method is a short, synchronous local transaction. Implementations
/// must make [`LocalStore::enqueue`] atomic with respect to its own
/// read-modify-write of the queue slot for an entity.
pub trait LocalStore: Send + Sync {
    /// All queued actions, oldest first
    fn sync_queue_all(&self) -> Result<Vec<SyncAction>>;

    fn queue_item(&self, id: &ActionId) -> Result<Option<SyncAction>>;

    /// Fold a mutation into the queue using the merge-on-enqueue rules
    fn enqueue(
        &self,
        table: SyncTable,
        operation: SyncOperation,
        entity_id: &str,
        payload: Payload,
    ) -> Result<EnqueueOutcome>;

    fn remove_from_queue(&self, id: &ActionId) -> Result<bool>;

    /// Remove a transmitted action unless it was merged into after the
    /// snapshot was taken. Returns whether it was removed.
    fn acknowledge_action(&self, action: &SyncAction) -> Result<bool>;

    fn update_queue_item(&self, id: &ActionId, update: QueueItemUpdate) -> Result<SyncAction>;

    fn clear_queue(&self) -> Result<()>;

    fn queue_count(&self) -> Result<usize>;

    fn sync_meta(&self) -> Result<Option<SyncMeta>>;

    fn set_sync_meta(&self, update: SyncMetaUpdate) -> Result<SyncMeta>;

    /// Annotate an entity; `None` keeps a previously assigned server id
    fn upsert_entity_sync_status(
        &self,
        table: SyncTable,
        entity_id: &str,
        status: SyncStatus,
        server_id: Option<&str>,
    ) -> Result<bool>;

    /// Mark never-synced, non-default entities pending and queue a create for
    /// each. Returns how many entities were affected.
    fn mark_all_local_entities_pending(&self) -> Result<usize>;

    /// Write a pulled expense if `rule` accepts it. Returns whether it was written.
    fn merge_remote_expense(&self, remote: Expense, rule: ConflictRule<Expense>) -> Result<bool>;

    /// Write a pulled category if `rule` accepts it. Returns whether it was written.
    fn merge_remote_category(&self, remote: Category, rule: ConflictRule<Category>)
        -> Result<bool>;

    /// Replace local preferences with the pulled copy
    fn merge_remote_preferences(&self, remote: Preferences) -> Result<()>;
}
