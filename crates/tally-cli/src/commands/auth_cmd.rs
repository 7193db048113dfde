use std::future::Future;
use std::path::Path;

use tally_core::auth::AuthResult;
use tally_core::DatabaseService;
use tracing::warn;

use crate::auth::{clear_stored_session, load_stored_session, SupabaseAuthService};
use crate::cli::AuthCommands;
use crate::commands::common::{build_sync_engine, open_database};
use crate::commands::sync::{report_sync_result, reset_sync_state};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub async fn run_auth(
    command: AuthCommands,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            profile,
            email,
            password,
        } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let profile_config = config.profile(&profile_name).ok_or_else(|| {
                CliError::Config(format!(
                    "Profile '{profile_name}' is not configured. Run `tally config init --profile {profile_name}` first."
                ))
            })?;
            let auth_service = SupabaseAuthService::new_for_profile(&profile_name, profile_config)
                .map_err(|error| CliError::Auth(error.to_string()))?
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "Profile '{profile_name}' missing Supabase auth config. Set SUPABASE_URL and SUPABASE_ANON_KEY via `tally config init`."
                    ))
                })?;
            let session = auth_service
                .sign_in(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            println!("Signed in profile '{profile_name}' as {email_label}");

            let engine = build_sync_engine(db_path, &profile_config.remote_config(), &session)?;
            let result = engine.initialize_sync(session.user_id()).await;
            report_sync_result(&result)
        }
        AuthCommands::Status { profile } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let Some(profile) = config.profile(&profile_name) else {
                println!("Profile '{profile_name}' is not configured.");
                return Ok(());
            };

            let maybe_auth_service = SupabaseAuthService::new_for_profile(&profile_name, profile)
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let session = if let Some(service) = maybe_auth_service {
                service
                    .restore_session()
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?
            } else {
                load_stored_session(&profile_name)
                    .map_err(|error| CliError::Auth(error.to_string()))?
            };

            if let Some(session) = session {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Profile '{}' is signed in as {} (expires_at={})",
                    profile_name, email_label, session.expires_at
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));

            let stored_session = load_stored_session(&profile_name)
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let maybe_auth_service = match config.profile(&profile_name) {
                Some(profile) => SupabaseAuthService::new_for_profile(&profile_name, profile)
                    .map_err(|error| CliError::Auth(error.to_string()))?,
                None => None,
            };

            let revoke = match (maybe_auth_service, stored_session) {
                (Some(service), Some(session)) => Some(async move {
                    service.sign_out(&session.access_token).await
                }),
                _ => None,
            };
            logout_profile(&profile_name, revoke, &open_database(db_path)?).await?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

/// Forget the profile's session and reset local sync state. A failed remote
/// revoke only warns; logging out offline still clears everything local.
pub async fn logout_profile<F>(
    profile_name: &str,
    revoke: Option<F>,
    db: &DatabaseService,
) -> Result<(), CliError>
where
    F: Future<Output = AuthResult<()>>,
{
    if let Some(revoke) = revoke {
        if let Err(error) = revoke.await {
            warn!(profile = profile_name, "Remote sign-out failed: {error}");
            eprintln!("Warning: could not revoke the session remotely: {error}");
        }
    }

    clear_stored_session(profile_name).map_err(|error| CliError::Auth(error.to_string()))?;
    reset_sync_state(db)?;
    Ok(())
}
