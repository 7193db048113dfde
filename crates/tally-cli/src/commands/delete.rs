use std::path::Path;

use crate::commands::common::{open_database, resolve_expense};
use crate::error::CliError;

pub fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let expense = resolve_expense(id, &db)?;

    db.delete_expense(&expense.id)?;
    println!("{}", expense.id);
    Ok(())
}
