//! Shared database service wrapper used across clients.
//!
//! Every UI-facing mutation writes the entity and folds the matching sync
//! action into the queue inside one `SQLite` transaction, then notifies
//! subscribers once the transaction has committed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};
use serde_json::json;

use super::changes::{ChangeNotifier, StoreTable, SubscriptionId};
use crate::db::{
    CategoryRepository, Database, ExpenseRepository, PreferencesRepository,
    SqliteCategoryRepository, SqliteExpenseRepository, SqlitePreferencesRepository,
    SqliteSyncRepository,
};
use crate::models::{
    entity_payload, ActionId, Category, CategoryId, CategoryUpdate, Expense, ExpenseId,
    ExpenseUpdate, NewCategory, NewExpense, Payload, Preferences, PreferencesUpdate,
    QueueItemUpdate, SyncAction, SyncMeta, SyncMetaUpdate, SyncOperation, SyncStatus, SyncTable,
    PREFERENCES_ENTITY_ID,
};
use crate::sync::{plan_enqueue, ConflictRule, EnqueueOutcome, LocalStore, QueuePlan};
use crate::{Error, Result};

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    changes: Arc<ChangeNotifier>,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("db_path", &self.db_path)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            changes: Arc::default(),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            changes: Arc::default(),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Register a callback invoked after any committed mutation to `table`.
    pub fn subscribe<F>(&self, table: StoreTable, callback: F) -> SubscriptionId
    where
        F: Fn(StoreTable) + Send + Sync + 'static,
    {
        self.changes.subscribe(table, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.db.lock()?;
        f(db.connection())
    }

    /// Run `f` in a transaction and notify `touched` after commit.
    fn write<T>(
        &self,
        touched: &[StoreTable],
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let value = {
            let mut db = self.db.lock()?;
            let tx = db.connection_mut().transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            value
        };
        self.changes.notify(touched);
        Ok(value)
    }

    fn require_category(conn: &Connection, id: &CategoryId) -> Result<()> {
        if SqliteCategoryRepository::new(conn).get(id)?.is_none() {
            return Err(Error::InvalidInput(format!("unknown category {id}")));
        }
        Ok(())
    }

    // -- expenses ---------------------------------------------------------

    /// List live expenses, newest date first.
    pub fn list_expenses(&self, limit: usize, offset: usize) -> Result<Vec<Expense>> {
        self.read(|conn| SqliteExpenseRepository::new(conn).list(limit, offset))
    }

    pub fn get_expense(&self, id: &ExpenseId) -> Result<Option<Expense>> {
        self.read(|conn| SqliteExpenseRepository::new(conn).get(id))
    }

    /// Poison the connection lock so every later access fails
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let db = Arc::clone(&self.db);
        let _ = std::thread::spawn(move || {
            let _guard = db.lock();
            panic!("poisoning the store lock");
        })
        .join();
    }

    /// Includes soft-deleted rows
    #[cfg(test)]
    pub(crate) fn get_expense_any(&self, id: &ExpenseId) -> Result<Option<Expense>> {
        self.read(|conn| SqliteExpenseRepository::new(conn).get_any(id))
    }

    /// Record a new expense and queue its creation.
    pub fn create_expense(&self, input: NewExpense) -> Result<Expense> {
        let expense = Expense::new(input)?;
        self.write(&[StoreTable::Expenses, StoreTable::SyncQueue], |tx| {
            Self::insert_expense(tx, &expense)
        })?;
        tracing::debug!("Created expense {}", expense.id);
        Ok(expense)
    }

    fn insert_expense(conn: &Connection, expense: &Expense) -> Result<()> {
        Self::require_category(conn, &expense.category_id)?;
        SqliteExpenseRepository::new(conn).insert(expense)?;
        enqueue_in(
            conn,
            SyncTable::Expenses,
            SyncOperation::Create,
            &expense.id.as_str(),
            entity_payload(expense)?,
        )?;
        Ok(())
    }

    /// Import many expenses at once.
    ///
    /// Every row is validated before anything is written; the rows and one
    /// `create` action per row commit together.
    pub fn import_expenses(&self, inputs: Vec<NewExpense>) -> Result<Vec<Expense>> {
        let expenses = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                Expense::new(input).map_err(|error| {
                    Error::InvalidInput(format!("row {}: {error}", index + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.write(&[StoreTable::Expenses, StoreTable::SyncQueue], |tx| {
            for expense in &expenses {
                Self::insert_expense(tx, expense)?;
            }
            Ok(())
        })?;
        tracing::info!("Imported {} expenses", expenses.len());
        Ok(expenses)
    }

    pub fn update_expense(&self, id: &ExpenseId, update: ExpenseUpdate) -> Result<Expense> {
        self.write(&[StoreTable::Expenses, StoreTable::SyncQueue], |tx| {
            let repo = SqliteExpenseRepository::new(tx);
            let mut expense = repo
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("expense {id}")))?;
            let category_changed = update
                .category_id
                .is_some_and(|category_id| category_id != expense.category_id);

            expense.apply(update)?;
            if category_changed {
                Self::require_category(tx, &expense.category_id)?;
            }
            repo.put(&expense)?;
            enqueue_in(
                tx,
                SyncTable::Expenses,
                SyncOperation::Update,
                &expense.id.as_str(),
                entity_payload(&expense)?,
            )?;
            Ok(expense)
        })
    }

    /// Soft-delete an expense and queue the tombstone.
    pub fn delete_expense(&self, id: &ExpenseId) -> Result<()> {
        self.write(&[StoreTable::Expenses, StoreTable::SyncQueue], |tx| {
            let repo = SqliteExpenseRepository::new(tx);
            let mut expense = repo
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("expense {id}")))?;

            let now = chrono::Utc::now().timestamp_millis().max(expense.updated_at);
            expense.is_deleted = true;
            expense.updated_at = now;
            expense.sync.status = SyncStatus::Pending;
            repo.put(&expense)?;
            enqueue_in(
                tx,
                SyncTable::Expenses,
                SyncOperation::Delete,
                &expense.id.as_str(),
                tombstone_payload(&expense.id.as_str(), now),
            )?;
            Ok(())
        })
    }

    // -- categories -------------------------------------------------------

    pub fn list_categories(&self, include_hidden: bool) -> Result<Vec<Category>> {
        self.read(|conn| SqliteCategoryRepository::new(conn).list(include_hidden))
    }

    pub fn get_category(&self, id: &CategoryId) -> Result<Option<Category>> {
        self.read(|conn| SqliteCategoryRepository::new(conn).get(id))
    }

    pub fn create_category(&self, input: NewCategory) -> Result<Category> {
        self.write(&[StoreTable::Categories, StoreTable::SyncQueue], |tx| {
            let repo = SqliteCategoryRepository::new(tx);
            let category = Category::new(input, repo.next_sort_order()?)?;
            repo.put(&category)?;
            enqueue_in(
                tx,
                SyncTable::Categories,
                SyncOperation::Create,
                &category.id.as_str(),
                entity_payload(&category)?,
            )?;
            Ok(category)
        })
    }

    pub fn update_category(&self, id: &CategoryId, update: CategoryUpdate) -> Result<Category> {
        self.write(&[StoreTable::Categories, StoreTable::SyncQueue], |tx| {
            let repo = SqliteCategoryRepository::new(tx);
            let mut category = repo
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("category {id}")))?;
            category.apply(update)?;
            repo.put(&category)?;
            enqueue_in(
                tx,
                SyncTable::Categories,
                SyncOperation::Update,
                &category.id.as_str(),
                entity_payload(&category)?,
            )?;
            Ok(category)
        })
    }

    /// Soft-delete a user-defined category. Default categories are protected.
    pub fn delete_category(&self, id: &CategoryId) -> Result<()> {
        self.write(&[StoreTable::Categories, StoreTable::SyncQueue], |tx| {
            let repo = SqliteCategoryRepository::new(tx);
            let mut category = repo
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("category {id}")))?;
            if category.is_default {
                return Err(Error::InvalidInput(format!(
                    "default category '{}' cannot be deleted",
                    category.name
                )));
            }

            category.is_deleted = true;
            category.sync.status = SyncStatus::Pending;
            repo.put(&category)?;
            enqueue_in(
                tx,
                SyncTable::Categories,
                SyncOperation::Delete,
                &category.id.as_str(),
                tombstone_payload(&category.id.as_str(), chrono::Utc::now().timestamp_millis()),
            )?;
            Ok(())
        })
    }

    // -- preferences ------------------------------------------------------

    /// Stored preferences, or the defaults if none were ever saved
    pub fn preferences(&self) -> Result<Preferences> {
        self.read(|conn| {
            Ok(SqlitePreferencesRepository::new(conn)
                .load()?
                .unwrap_or_default())
        })
    }

    pub fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences> {
        self.write(&[StoreTable::Preferences, StoreTable::SyncQueue], |tx| {
            let repo = SqlitePreferencesRepository::new(tx);
            let mut preferences = repo.load()?.unwrap_or_default();
            preferences.apply(update)?;
            repo.save(&preferences)?;
            enqueue_in(
                tx,
                SyncTable::Preferences,
                SyncOperation::Update,
                PREFERENCES_ENTITY_ID,
                entity_payload(&preferences)?,
            )?;
            Ok(preferences)
        })
    }
}

/// Fold a mutation into the queue within an open transaction
fn enqueue_in(
    conn: &Connection,
    table: SyncTable,
    operation: SyncOperation,
    entity_id: &str,
    payload: Payload,
) -> Result<EnqueueOutcome> {
    let repo = SqliteSyncRepository::new(conn);
    let existing = repo.queue_find(table, entity_id)?;
    let plan = plan_enqueue(
        existing.as_ref(),
        table,
        operation,
        entity_id,
        payload,
        chrono::Utc::now().timestamp_millis(),
    );
    let outcome = plan.outcome();

    match plan {
        QueuePlan::Append(action) => repo.queue_insert(&action)?,
        QueuePlan::Update(action, update) => {
            repo.queue_update(&action.id, &update)?;
        }
        QueuePlan::Remove(action) => {
            repo.queue_remove(&action.id)?;
        }
        QueuePlan::Nothing => {}
    }

    tracing::debug!("Queued {operation} for {table}/{entity_id}: {outcome:?}");
    Ok(outcome)
}

fn tombstone_payload(entity_id: &str, deleted_at: i64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("id".into(), json!(entity_id));
    payload.insert("deleted_at".into(), json!(deleted_at));
    payload
}

impl LocalStore for DatabaseService {
    fn sync_queue_all(&self) -> Result<Vec<SyncAction>> {
        self.read(|conn| SqliteSyncRepository::new(conn).queue_all())
    }

    fn queue_item(&self, id: &ActionId) -> Result<Option<SyncAction>> {
        self.read(|conn| SqliteSyncRepository::new(conn).queue_get(id))
    }

    fn enqueue(
        &self,
        table: SyncTable,
        operation: SyncOperation,
        entity_id: &str,
        payload: Payload,
    ) -> Result<EnqueueOutcome> {
        self.write(&[StoreTable::SyncQueue], |tx| {
            enqueue_in(tx, table, operation, entity_id, payload)
        })
    }

    fn remove_from_queue(&self, id: &ActionId) -> Result<bool> {
        self.write(&[StoreTable::SyncQueue], |tx| {
            SqliteSyncRepository::new(tx).queue_remove(id)
        })
    }

    fn acknowledge_action(&self, action: &SyncAction) -> Result<bool> {
        self.write(&[StoreTable::SyncQueue], |tx| {
            SqliteSyncRepository::new(tx).queue_remove_if_unchanged(&action.id, action.timestamp)
        })
    }

    fn update_queue_item(&self, id: &ActionId, update: QueueItemUpdate) -> Result<SyncAction> {
        self.write(&[StoreTable::SyncQueue], |tx| {
            SqliteSyncRepository::new(tx).queue_update(id, &update)
        })
    }

    fn clear_queue(&self) -> Result<()> {
        self.write(&[StoreTable::SyncQueue], |tx| {
            SqliteSyncRepository::new(tx).queue_clear()
        })
    }

    fn queue_count(&self) -> Result<usize> {
        self.read(|conn| SqliteSyncRepository::new(conn).queue_count())
    }

    fn sync_meta(&self) -> Result<Option<SyncMeta>> {
        self.read(|conn| SqliteSyncRepository::new(conn).meta_get())
    }

    fn set_sync_meta(&self, update: SyncMetaUpdate) -> Result<SyncMeta> {
        self.write(&[StoreTable::SyncMeta], |tx| {
            SqliteSyncRepository::new(tx).meta_set(&update)
        })
    }

    fn upsert_entity_sync_status(
        &self,
        table: SyncTable,
        entity_id: &str,
        status: SyncStatus,
        server_id: Option<&str>,
    ) -> Result<bool> {
        let synced_at = (status == SyncStatus::Synced).then(|| chrono::Utc::now().timestamp_millis());
        self.write(&[store_table(table)], |tx| {
            SqliteSyncRepository::new(tx).set_entity_sync_status(
                table, entity_id, status, server_id, synced_at,
            )
        })
    }

    fn mark_all_local_entities_pending(&self) -> Result<usize> {
        self.write(
            &[
                StoreTable::Expenses,
                StoreTable::Categories,
                StoreTable::Preferences,
                StoreTable::SyncQueue,
            ],
            |tx| {
                let mut marked = 0;

                let expenses = SqliteExpenseRepository::new(tx);
                for mut expense in expenses.list_local_only()? {
                    expense.sync.status = SyncStatus::Pending;
                    expenses.put(&expense)?;
                    enqueue_in(
                        tx,
                        SyncTable::Expenses,
                        SyncOperation::Create,
                        &expense.id.as_str(),
                        entity_payload(&expense)?,
                    )?;
                    marked += 1;
                }

                let categories = SqliteCategoryRepository::new(tx);
                for mut category in categories.list_local_only()? {
                    category.sync.status = SyncStatus::Pending;
                    categories.put(&category)?;
                    enqueue_in(
                        tx,
                        SyncTable::Categories,
                        SyncOperation::Create,
                        &category.id.as_str(),
                        entity_payload(&category)?,
                    )?;
                    marked += 1;
                }

                let preferences = SqlitePreferencesRepository::new(tx);
                if let Some(mut stored) = preferences.load()? {
                    if stored.sync.server_id.is_none() {
                        stored.sync.status = SyncStatus::Pending;
                        preferences.save(&stored)?;
                        enqueue_in(
                            tx,
                            SyncTable::Preferences,
                            SyncOperation::Update,
                            PREFERENCES_ENTITY_ID,
                            entity_payload(&stored)?,
                        )?;
                        marked += 1;
                    }
                }

                Ok(marked)
            },
        )
    }

    fn merge_remote_expense(&self, remote: Expense, rule: ConflictRule<Expense>) -> Result<bool> {
        self.write(&[StoreTable::Expenses], |tx| {
            let repo = SqliteExpenseRepository::new(tx);
            let local = repo.get_any(&remote.id)?;
            if !rule(local.as_ref(), &remote) {
                return Ok(false);
            }
            repo.put(&remote)?;
            Ok(true)
        })
    }

    fn merge_remote_category(
        &self,
        remote: Category,
        rule: ConflictRule<Category>,
    ) -> Result<bool> {
        self.write(&[StoreTable::Categories], |tx| {
            let repo = SqliteCategoryRepository::new(tx);
            let local = repo.get_any(&remote.id)?;
            if !rule(local.as_ref(), &remote) {
                return Ok(false);
            }
            repo.put(&remote)?;
            Ok(true)
        })
    }

    fn merge_remote_preferences(&self, remote: Preferences) -> Result<()> {
        self.write(&[StoreTable::Preferences], |tx| {
            SqlitePreferencesRepository::new(tx).save(&remote)
        })
    }
}

const fn store_table(table: SyncTable) -> StoreTable {
    match table {
        SyncTable::Expenses => StoreTable::Expenses,
        SyncTable::Categories => StoreTable::Categories,
        SyncTable::Preferences => StoreTable::Preferences,
    }
}
