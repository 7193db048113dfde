use std::path::Path;

use serde::Serialize;
use tally_core::models::{SyncAction, SyncMetaUpdate};
use tally_core::sync::LocalStore;
use tally_core::{DatabaseService, SyncResult};

use crate::commands::common::{format_sync_timestamp, open_database, open_sync_context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncStatusReport {
    pub pending: usize,
    pub last_sync_at: Option<i64>,
    pub user_id: Option<String>,
    pub queue: Vec<SyncAction>,
}

pub async fn run_sync(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let context = open_sync_context(db_path, profile).await?;
    let result = context.engine.sync(context.user_id()).await;
    report_sync_result(&result)
}

pub fn report_sync_result(result: &SyncResult) -> Result<(), CliError> {
    for line in format_sync_result(result) {
        println!("{line}");
    }
    if result.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(result.errors.join("\n")))
    }
}

pub fn format_sync_result(result: &SyncResult) -> Vec<String> {
    if result.skipped {
        return vec!["Sync already in progress; nothing to do.".to_string()];
    }

    let mut lines = vec![format!(
        "Pushed {}, pulled {} (expenses {}, categories {}, preferences {})",
        result.pushed,
        result.pulled.total(),
        result.pulled.expenses,
        result.pulled.categories,
        result.pulled.preferences
    )];
    if result.failed > 0 {
        lines.push(format!("{} change(s) could not be synced", result.failed));
    }
    if let Some(last_sync_at) = result.last_sync_at {
        lines.push(format!("Last sync: {}", format_sync_timestamp(last_sync_at)));
    }
    lines
}

pub fn run_sync_status(db_path: &Path, as_json: bool) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let report = sync_status_report(&db)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.last_sync_at {
        Some(timestamp) => println!("Last sync: {}", format_sync_timestamp(timestamp)),
        None => println!("Never synced"),
    }
    println!("Pending changes: {}", report.pending);
    for action in &report.queue {
        let retries = if action.retry_count > 0 {
            format!("  (retry {})", action.retry_count)
        } else {
            String::new()
        };
        println!(
            "  {:<7} {:<12} {}{}",
            action.operation.to_string(),
            action.table.to_string(),
            action.entity_id,
            retries
        );
    }
    Ok(())
}

pub fn sync_status_report(db: &DatabaseService) -> Result<SyncStatusReport, CliError> {
    let meta = db.sync_meta()?.unwrap_or_default();
    let queue = db.sync_queue_all()?;
    Ok(SyncStatusReport {
        pending: queue.len(),
        last_sync_at: meta.last_sync_at,
        user_id: meta.user_id,
        queue,
    })
}

/// Same effect as the engine's logout reset, without needing a session.
pub fn reset_sync_state(db: &DatabaseService) -> Result<(), CliError> {
    db.clear_queue()?;
    db.set_sync_meta(SyncMetaUpdate::reset())?;
    Ok(())
}

pub fn run_sync_reset(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    reset_sync_state(&db)?;
    println!("Sync queue and checkpoint cleared. Local data was kept.");
    Ok(())
}
