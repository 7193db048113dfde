use std::io;

use tally_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Expense ID cannot be empty")]
    EmptyExpenseId,
    #[error("Expense not found for id/prefix: {0}")]
    ExpenseNotFound(String),
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not signed in. Run `tally auth login --email <email> --password <password>`.")]
    NotSignedIn,
    #[error("Sync is not configured. Run `tally config init` + `tally auth login` first.")]
    SyncNotConfigured,
    #[error("Sync finished with errors:\n{0}")]
    SyncFailed(String),
}
