use std::path::Path;

use chrono::Utc;

use crate::commands::common::{
    category_names, expense_to_list_item, format_expense_lines, open_database, ExpenseListItem,
};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let expenses = db.list_expenses(limit, 0)?;
    let names = category_names(&db.list_categories(true)?);

    if as_json {
        let now_ms = Utc::now().timestamp_millis();
        let json_items = expenses
            .iter()
            .map(|expense| expense_to_list_item(expense, &names, now_ms))
            .collect::<Vec<ExpenseListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if expenses.is_empty() {
        println!("No expenses recorded.");
    } else {
        for line in format_expense_lines(&expenses, &names) {
            println!("{line}");
        }
    }

    Ok(())
}
