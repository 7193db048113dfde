use std::path::Path;
use std::time::Duration;

use tally_core::sync::SyncScheduler;
use tally_core::SyncState;
use tracing::warn;

use crate::commands::common::{format_sync_timestamp, open_sync_context};
use crate::commands::sync::format_sync_result;
use crate::error::CliError;

const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Sync immediately, then on the profile's interval, until Ctrl-C.
pub async fn run_watch(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let context = open_sync_context(db_path, profile).await?;
    let every = context.config.sync_interval();
    println!(
        "Watching profile '{}' (every {}s). Press Ctrl-C to stop.",
        context.profile_name,
        every.as_secs()
    );

    let handle = SyncScheduler::start(
        context.engine.clone(),
        context.user_id().to_string(),
        every,
    );
    if let Some(result) = handle.trigger().await {
        for line in format_sync_result(&result) {
            println!("{line}");
        }
    }

    let mut status = context.engine.subscribe_status();
    let mut session_check = tokio::time::interval(SESSION_CHECK_INTERVAL);
    session_check.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                match snapshot.state {
                    SyncState::Synced => println!(
                        "synced  pending={}  last={}",
                        snapshot.pending_count,
                        snapshot
                            .last_sync_at
                            .map_or_else(|| "never".to_string(), format_sync_timestamp)
                    ),
                    SyncState::Error => println!(
                        "error   pending={}  {}",
                        snapshot.pending_count,
                        snapshot.last_error.as_deref().unwrap_or("unknown error")
                    ),
                    SyncState::Syncing | SyncState::Offline => {}
                }
            }
            _ = session_check.tick() => {
                match context.auth.restore_session().await {
                    Ok(Some(session)) => context
                        .engine
                        .remote()
                        .set_access_token(session.access_token),
                    Ok(None) => {
                        warn!("Session ended; stopping background sync");
                        break;
                    }
                    Err(error) => warn!("Failed to refresh session: {error}"),
                }
            }
        }
    }

    handle.stop().await;
    println!("Stopped.");
    Ok(())
}
