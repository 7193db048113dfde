use std::path::Path;

use tally_core::models::NewCategory;

use crate::cli::CategoryCommands;
use crate::commands::common::{open_database, resolve_category, short_id};
use crate::error::CliError;

pub fn run_category(command: CategoryCommands, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    match command {
        CategoryCommands::List { all, json } => {
            let categories = db.list_categories(all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
                return Ok(());
            }
            for category in categories {
                let mut flags = Vec::new();
                if category.is_default {
                    flags.push("default");
                }
                if category.is_hidden {
                    flags.push("hidden");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!("  ({})", flags.join(", "))
                };
                println!(
                    "{:<13}  {:<8}  {:<16}  {}{}",
                    short_id(&category.id.as_str()),
                    category.color,
                    category.name,
                    category.icon,
                    flags
                );
            }
        }
        CategoryCommands::Add { name, icon, color } => {
            let category = db.create_category(NewCategory {
                name,
                icon,
                color,
                sort_order: None,
            })?;
            println!("{}", category.id);
        }
        CategoryCommands::Delete { category } => {
            let category = resolve_category(&category, &db)?;
            db.delete_category(&category.id)?;
            println!("{}", category.id);
        }
    }
    Ok(())
}
