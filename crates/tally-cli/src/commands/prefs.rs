use std::path::Path;

use tally_core::models::{Preferences, PreferencesUpdate};

use crate::cli::PrefsCommands;
use crate::commands::common::open_database;
use crate::error::CliError;

pub fn run_prefs(command: Option<PrefsCommands>, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    match command.unwrap_or(PrefsCommands::Show) {
        PrefsCommands::Show => print_preferences(&db.preferences()?),
        PrefsCommands::Set {
            currency,
            date_format,
            theme,
        } => {
            let theme = theme
                .map(|value| value.parse())
                .transpose()
                .map_err(CliError::InvalidInput)?;
            let updated = db.update_preferences(PreferencesUpdate {
                date_format,
                default_currency: currency,
                theme,
            })?;
            print_preferences(&updated);
        }
    }
    Ok(())
}

fn print_preferences(preferences: &Preferences) {
    println!("currency     {}", preferences.default_currency);
    println!("date format  {}", preferences.date_format);
    println!("theme        {}", preferences.theme.as_str());
    println!("sync         {}", preferences.sync.status.as_str());
}
