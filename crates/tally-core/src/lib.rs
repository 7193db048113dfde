//! tally-core - Core library for Tally
//!
//! Models, the `SQLite` local store, and the offline sync engine used by the
//! `tally` CLI. The local store is the source of truth; every mutation is
//! queued and later pushed to the remote store, and remote changes are pulled
//! back with per-table conflict rules.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use models::{Category, CategoryId, Expense, ExpenseId, Preferences};
pub use services::DatabaseService;
pub use state::{SyncSnapshot, SyncState};
pub use sync::{SyncEngine, SyncResult};
