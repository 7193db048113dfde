//! In-memory `RemoteStore` for tests: tenant-keyed rows, a server clock that
//! stamps `updated_at`, failure injection, and call counting.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{CategoryRow, ExpenseRow, PreferencesRow, RemoteError, RemoteResult, RemoteStore};
use crate::models::SyncTable;

type RowKey = (String, String);

#[derive(Default)]
struct State {
    expenses: BTreeMap<RowKey, ExpenseRow>,
    categories: BTreeMap<RowKey, CategoryRow>,
    preferences: BTreeMap<String, PreferencesRow>,
    next_id: u64,
    clock: i64,
    failing_writes: u32,
    failing_fetches: HashSet<SyncTable>,
    write_calls: usize,
    fetch_calls: usize,
}

impl State {
    /// Advance the server clock (never behind wall time) and return it
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock = (self.clock + 1).max(Utc::now().timestamp_millis());
        DateTime::from_timestamp_millis(self.clock).unwrap_or_default()
    }

    fn assign_id(&mut self) -> String {
        self.next_id += 1;
        format!("srv-{}", self.next_id)
    }

    fn begin_write(&mut self) -> RemoteResult<()> {
        self.write_calls += 1;
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(RemoteError::Api("injected failure (503)".to_string()));
        }
        Ok(())
    }

    fn begin_fetch(&mut self, table: SyncTable) -> RemoteResult<()> {
        self.fetch_calls += 1;
        if self.failing_fetches.contains(&table) {
            return Err(RemoteError::Api(format!("injected {table} failure (500)")));
        }
        Ok(())
    }
}

fn changed_since(updated_at: Option<DateTime<Utc>>, since: Option<DateTime<Utc>>) -> bool {
    match (updated_at, since) {
        (_, None) => true,
        (Some(updated_at), Some(since)) => updated_at > since,
        (None, Some(_)) => false,
    }
}

pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` write calls
    pub fn fail_writes(&self, count: u32) {
        self.state().failing_writes = count;
    }

    /// Fail every fetch of `table` until cleared
    pub fn fail_fetches(&self, table: SyncTable, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_fetches.insert(table);
        } else {
            state.failing_fetches.remove(&table);
        }
    }

    pub fn write_calls(&self) -> usize {
        self.state().write_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }

    pub fn expense(&self, user_id: &str, local_id: &str) -> Option<ExpenseRow> {
        self.state()
            .expenses
            .get(&(user_id.to_string(), local_id.to_string()))
            .cloned()
    }

    pub fn expense_count(&self) -> usize {
        self.state().expenses.len()
    }

    pub fn category(&self, user_id: &str, local_id: &str) -> Option<CategoryRow> {
        self.state()
            .categories
            .get(&(user_id.to_string(), local_id.to_string()))
            .cloned()
    }

    pub fn preferences(&self, user_id: &str) -> Option<PreferencesRow> {
        self.state().preferences.get(user_id).cloned()
    }

    /// Write as another device would. Rows without `updated_at` are stamped
    /// with the server clock.
    pub fn seed_expense(&self, mut row: ExpenseRow) -> ExpenseRow {
        let mut state = self.state();
        row.id = Some(row.id.unwrap_or_else(|| state.assign_id()));
        row.updated_at = Some(row.updated_at.unwrap_or_else(|| state.tick()));
        state
            .expenses
            .insert((row.user_id.clone(), row.local_id.clone()), row.clone());
        row
    }

    pub fn seed_category(&self, mut row: CategoryRow) -> CategoryRow {
        let mut state = self.state();
        row.id = Some(row.id.unwrap_or_else(|| state.assign_id()));
        row.updated_at = Some(row.updated_at.unwrap_or_else(|| state.tick()));
        state
            .categories
            .insert((row.user_id.clone(), row.local_id.clone()), row.clone());
        row
    }

    pub fn seed_preferences(&self, mut row: PreferencesRow) -> PreferencesRow {
        let mut state = self.state();
        row.id = Some(row.id.unwrap_or_else(|| state.assign_id()));
        row.updated_at = Some(row.updated_at.unwrap_or_else(|| state.tick()));
        state.preferences.insert(row.user_id.clone(), row.clone());
        row
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn upsert_expense(&self, row: &ExpenseRow) -> RemoteResult<String> {
        row.validate()?;
        let mut state = self.state();
        state.begin_write()?;

        let key = (row.user_id.clone(), row.local_id.clone());
        let existing = state.expenses.get(&key).cloned();
        let mut stored = row.clone();
        stored.id = match existing.as_ref().and_then(|existing| existing.id.clone()) {
            Some(id) => Some(id),
            None => Some(state.assign_id()),
        };
        stored.deleted_at = row
            .deleted_at
            .or_else(|| existing.and_then(|existing| existing.deleted_at));
        stored.updated_at = Some(state.tick());

        let id = stored.id.clone().unwrap_or_default();
        state.expenses.insert(key, stored);
        Ok(id)
    }

    async fn upsert_category(&self, row: &CategoryRow) -> RemoteResult<String> {
        row.validate()?;
        let mut state = self.state();
        state.begin_write()?;

        let key = (row.user_id.clone(), row.local_id.clone());
        let existing = state.categories.get(&key).cloned();
        let mut stored = row.clone();
        stored.id = match existing.as_ref().and_then(|existing| existing.id.clone()) {
            Some(id) => Some(id),
            None => Some(state.assign_id()),
        };
        stored.deleted_at = row
            .deleted_at
            .or_else(|| existing.and_then(|existing| existing.deleted_at));
        stored.updated_at = Some(state.tick());

        let id = stored.id.clone().unwrap_or_default();
        state.categories.insert(key, stored);
        Ok(id)
    }

    async fn upsert_preferences(&self, row: &PreferencesRow) -> RemoteResult<String> {
        row.validate()?;
        let mut state = self.state();
        state.begin_write()?;

        let existing_id = state
            .preferences
            .get(&row.user_id)
            .and_then(|existing| existing.id.clone());
        let mut stored = row.clone();
        stored.id = Some(existing_id.unwrap_or_else(|| state.assign_id()));
        stored.updated_at = Some(state.tick());

        let id = stored.id.clone().unwrap_or_default();
        state.preferences.insert(row.user_id.clone(), stored);
        Ok(id)
    }

    async fn soft_delete(
        &self,
        table: SyncTable,
        user_id: &str,
        local_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin_write()?;

        let key = (user_id.to_string(), local_id.to_string());
        let now = state.tick();
        match table {
            SyncTable::Expenses => {
                if let Some(row) = state.expenses.get_mut(&key) {
                    row.deleted_at = Some(deleted_at);
                    row.updated_at = Some(now);
                }
            }
            SyncTable::Categories => {
                if let Some(row) = state.categories.get_mut(&key) {
                    row.deleted_at = Some(deleted_at);
                    row.updated_at = Some(now);
                }
            }
            SyncTable::Preferences => {
                return Err(RemoteError::Unsupported(
                    "preferences cannot be deleted".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn fetch_expenses(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<ExpenseRow>> {
        let mut state = self.state();
        state.begin_fetch(SyncTable::Expenses)?;
        let mut rows: Vec<_> = state
            .expenses
            .values()
            .filter(|row| row.user_id == user_id && changed_since(row.updated_at, since))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        Ok(rows)
    }

    async fn fetch_categories(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<CategoryRow>> {
        let mut state = self.state();
        state.begin_fetch(SyncTable::Categories)?;
        let mut rows: Vec<_> = state
            .categories
            .values()
            .filter(|row| row.user_id == user_id && changed_since(row.updated_at, since))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        Ok(rows)
    }

    async fn fetch_preferences(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Option<PreferencesRow>> {
        let mut state = self.state();
        state.begin_fetch(SyncTable::Preferences)?;
        Ok(state
            .preferences
            .get(user_id)
            .filter(|row| changed_since(row.updated_at, since))
            .cloned())
    }
}
