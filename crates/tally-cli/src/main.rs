//! Tally CLI - record expenses offline and sync them with Supabase.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::{run_add, AddArgs};
use crate::commands::auth_cmd::run_auth;
use crate::commands::category::run_category;
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::prefs::run_prefs;
use crate::commands::sync::{run_sync, run_sync_reset, run_sync_status};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Add {
            amount,
            description,
            category,
            date,
            currency,
            recurring,
        } => run_add(
            &AddArgs {
                amount: &amount,
                description: &description,
                category: category.as_deref(),
                date: date.as_deref(),
                currency: currency.as_deref(),
                recurring: recurring.as_deref(),
            },
            &db_path,
        )?,
        Commands::List { limit, json } => run_list(limit, json, &db_path)?,
        Commands::Edit {
            id,
            amount,
            description,
            category,
            date,
            currency,
            recurring,
        } => run_edit(
            &id,
            &EditArgs {
                amount: amount.as_deref(),
                description: description.as_deref(),
                category: category.as_deref(),
                date: date.as_deref(),
                currency: currency.as_deref(),
                recurring: recurring.as_deref(),
            },
            &db_path,
        )?,
        Commands::Delete { id } => run_delete(&id, &db_path)?,
        Commands::Import { path } => run_import(&path, &db_path)?,
        Commands::Category { command } => run_category(command, &db_path)?,
        Commands::Prefs { command } => run_prefs(command, &db_path)?,
        Commands::Sync { command } => match command {
            None => run_sync(&db_path, profile).await?,
            Some(SyncCommands::Status { json }) => run_sync_status(&db_path, json)?,
            Some(SyncCommands::Reset) => run_sync_reset(&db_path)?,
        },
        Commands::Watch => run_watch(&db_path, profile).await?,
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Auth { command } => run_auth(command, profile, &db_path).await?,
    }

    Ok(())
}
