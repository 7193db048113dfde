use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tally_core::models::{NewExpense, RecurringFrequency};
use tally_core::DatabaseService;

use crate::commands::common::{open_database, resolve_category};
use crate::error::CliError;

/// One expense in an import file. `category` is a name or ID.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportRow {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub recurring_frequency: Option<RecurringFrequency>,
}

pub fn run_import(path: &Path, db_path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let rows = parse_import(&raw)?;
    let db = open_database(db_path)?;

    let inputs = resolve_rows(rows, &db)?;
    let imported = db.import_expenses(inputs)?;
    println!(
        "Imported {} expenses; they will sync on the next `tally sync`.",
        imported.len()
    );
    Ok(())
}

pub fn parse_import(raw: &str) -> Result<Vec<ImportRow>, CliError> {
    serde_json::from_str(raw)
        .map_err(|error| CliError::InvalidInput(format!("invalid import file: {error}")))
}

pub fn resolve_rows(
    rows: Vec<ImportRow>,
    db: &DatabaseService,
) -> Result<Vec<NewExpense>, CliError> {
    let default_currency = db.preferences()?.default_currency;
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let category = resolve_category(&row.category, db).map_err(|error| {
                CliError::InvalidInput(format!("row {}: {error}", index + 1))
            })?;
            Ok(NewExpense {
                amount: row.amount,
                currency: row.currency.unwrap_or_else(|| default_currency.clone()),
                category_id: category.id,
                description: row.description,
                date: row.date,
                is_recurring: row.recurring_frequency.is_some(),
                recurring_frequency: row.recurring_frequency,
            })
        })
        .collect()
}
