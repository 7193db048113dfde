//! Database layer for Tally

mod category_repository;
mod columns;
mod connection;
mod expense_repository;
mod migrations;
mod preferences_repository;
mod sync_repository;

pub use category_repository::{CategoryRepository, SqliteCategoryRepository};
pub use connection::Database;
pub use expense_repository::{ExpenseRepository, SqliteExpenseRepository};
pub use preferences_repository::{PreferencesRepository, SqlitePreferencesRepository};
pub use sync_repository::SqliteSyncRepository;
