use std::path::Path;

use tally_core::models::ExpenseUpdate;

use crate::commands::common::{
    open_database, parse_amount, parse_date, parse_frequency, resolve_category, resolve_expense,
};
use crate::error::CliError;

#[derive(Default)]
pub struct EditArgs<'a> {
    pub amount: Option<&'a str>,
    pub description: Option<&'a str>,
    pub category: Option<&'a str>,
    pub date: Option<&'a str>,
    pub currency: Option<&'a str>,
    pub recurring: Option<&'a str>,
}

pub fn run_edit(id: &str, args: &EditArgs<'_>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let expense = resolve_expense(id, &db)?;

    let update = build_update(args, |query| Ok(resolve_category(query, &db)?.id))?;
    if update == ExpenseUpdate::default() {
        println!("{}", expense.id);
        return Ok(());
    }

    let updated = db.update_expense(&expense.id, update)?;
    println!("{}", updated.id);
    Ok(())
}

pub fn build_update<F>(args: &EditArgs<'_>, resolve: F) -> Result<ExpenseUpdate, CliError>
where
    F: Fn(&str) -> Result<tally_core::CategoryId, CliError>,
{
    let recurring_frequency = args.recurring.map(parse_frequency).transpose()?;
    Ok(ExpenseUpdate {
        amount: args.amount.map(parse_amount).transpose()?,
        currency: args.currency.map(str::to_string),
        category_id: args.category.map(resolve).transpose()?,
        description: args.description.map(|text| text.trim().to_string()),
        date: args
            .date
            .map(|date| parse_date(Some(date)))
            .transpose()?,
        is_recurring: recurring_frequency.map(|frequency| frequency.is_some()),
        recurring_frequency,
    })
}
