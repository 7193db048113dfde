use std::path::Path;

use tally_core::models::NewExpense;

use crate::commands::common::{
    default_category, open_database, parse_amount, parse_date, parse_frequency, resolve_category,
};
use crate::error::CliError;

pub struct AddArgs<'a> {
    pub amount: &'a str,
    pub description: &'a [String],
    pub category: Option<&'a str>,
    pub date: Option<&'a str>,
    pub currency: Option<&'a str>,
    pub recurring: Option<&'a str>,
}

pub fn run_add(args: &AddArgs<'_>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;

    let category = match args.category {
        Some(query) => resolve_category(query, &db)?,
        None => default_category(&db)?,
    };
    let currency = match args.currency {
        Some(code) => code.to_string(),
        None => db.preferences()?.default_currency,
    };
    let recurring_frequency = args.recurring.map(parse_frequency).transpose()?.flatten();

    let expense = db.create_expense(NewExpense {
        amount: parse_amount(args.amount)?,
        currency,
        category_id: category.id,
        description: args.description.join(" ").trim().to_string(),
        date: parse_date(args.date)?,
        is_recurring: recurring_frequency.is_some(),
        recurring_frequency,
    })?;

    println!("{}", expense.id);
    Ok(())
}
