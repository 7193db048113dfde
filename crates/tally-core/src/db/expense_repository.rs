//! Expense repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection, OptionalExtension};

use super::columns::{parse_column, parse_optional_column, sync_metadata};
use crate::error::Result;
use crate::models::{Expense, ExpenseId};

const EXPENSE_COLUMNS: &str = "id, amount, currency, category_id, description, date, is_recurring,
     recurring_frequency, created_at, updated_at, sync_status, server_id, synced_at, is_deleted";

/// Trait for expense storage operations
pub trait ExpenseRepository {
    /// Insert a new expense record
    fn insert(&self, expense: &Expense) -> Result<()>;

    /// Insert or overwrite an expense record, including its sync metadata
    fn put(&self, expense: &Expense) -> Result<()>;

    /// Get a live (not deleted) expense by ID
    fn get(&self, id: &ExpenseId) -> Result<Option<Expense>>;

    /// Get an expense by ID, including soft-deleted records
    fn get_any(&self, id: &ExpenseId) -> Result<Option<Expense>>;

    /// List expenses (excluding deleted), newest date first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Expense>>;

    /// Live expenses that have never been acknowledged by the remote store
    fn list_local_only(&self) -> Result<Vec<Expense>>;
}

/// `SQLite` implementation of `ExpenseRepository`
pub struct SqliteExpenseRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteExpenseRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an expense from a database row
    fn parse_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<Expense> {
        Ok(Expense {
            id: parse_column(row, 0)?,
            amount: parse_column(row, 1)?,
            currency: row.get(2)?,
            category_id: parse_column(row, 3)?,
            description: row.get(4)?,
            date: parse_column(row, 5)?,
            is_recurring: row.get(6)?,
            recurring_frequency: parse_optional_column(row, 7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            sync: sync_metadata(row, 10)?,
            is_deleted: row.get(13)?,
        })
    }

    fn query_one(&self, sql: &str, id: &ExpenseId) -> Result<Option<Expense>> {
        let expense = self
            .conn
            .query_row(sql, params![id.as_str()], Self::parse_expense)
            .optional()?;
        Ok(expense)
    }
}

impl ExpenseRepository for SqliteExpenseRepository<'_> {
    fn insert(&self, expense: &Expense) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO expenses ({EXPENSE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                expense.id.as_str(),
                expense.amount.to_string(),
                expense.currency,
                expense.category_id.as_str(),
                expense.description,
                expense.date.to_string(),
                expense.is_recurring,
                expense.recurring_frequency.map(|f| f.as_str()),
                expense.created_at,
                expense.updated_at,
                expense.sync.status.as_str(),
                expense.sync.server_id,
                expense.sync.synced_at,
                expense.is_deleted,
            ],
        )?;
        Ok(())
    }

    fn put(&self, expense: &Expense) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO expenses ({EXPENSE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    amount = ?2, currency = ?3, category_id = ?4, description = ?5,
                    date = ?6, is_recurring = ?7, recurring_frequency = ?8,
                    created_at = ?9, updated_at = ?10, sync_status = ?11,
                    server_id = ?12, synced_at = ?13, is_deleted = ?14"
            ),
            params![
                expense.id.as_str(),
                expense.amount.to_string(),
                expense.currency,
                expense.category_id.as_str(),
                expense.description,
                expense.date.to_string(),
                expense.is_recurring,
                expense.recurring_frequency.map(|f| f.as_str()),
                expense.created_at,
                expense.updated_at,
                expense.sync.status.as_str(),
                expense.sync.server_id,
                expense.sync.synced_at,
                expense.is_deleted,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ExpenseId) -> Result<Option<Expense>> {
        self.query_one(
            &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ? AND is_deleted = 0"),
            id,
        )
    }

    fn get_any(&self, id: &ExpenseId) -> Result<Option<Expense>> {
        self.query_one(
            &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?"),
            id,
        )
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Expense>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expenses
             WHERE is_deleted = 0
             ORDER BY date DESC, created_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let expenses = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_expense)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(expenses)
    }

    fn list_local_only(&self) -> Result<Vec<Expense>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expenses
             WHERE server_id IS NULL AND is_deleted = 0
             ORDER BY created_at ASC"
        ))?;

        let expenses = stmt
            .query_map([], Self::parse_expense)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(expenses)
    }
}
