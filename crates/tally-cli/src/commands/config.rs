use std::env;

use tally_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            sync_interval,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            supabase_url,
            supabase_anon_key,
            sync_interval,
            no_activate,
        ),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    sync_interval: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(
        &existing,
        supabase_url,
        supabase_anon_key,
        sync_interval,
        |name| env::var(name).ok(),
    )?;
    *config.profile_mut_or_default(&profile_name) = merged.clone();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let missing_fields = merged.missing_fields();
    if missing_fields.is_empty() {
        println!(
            "Sync profile '{profile_name}' is ready. Run `tally auth login --email <email> --password <password>`."
        );
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

/// Explicit flags win, then `SUPABASE_URL` / `SUPABASE_ANON_KEY` /
/// `TALLY_SYNC_INTERVAL_SECS`, then what the profile already had.
pub fn merge_profile<F>(
    existing: &CliProfile,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    sync_interval: Option<u64>,
    lookup_env: F,
) -> Result<CliProfile, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_interval = normalize_text_option(lookup_env("TALLY_SYNC_INTERVAL_SECS"))
        .map(|raw| {
            raw.parse::<u64>().map_err(|error| {
                CliError::Config(format!("TALLY_SYNC_INTERVAL_SECS must be a number: {error}"))
            })
        })
        .transpose()?;

    let merged = CliProfile {
        supabase_url: normalize_text_option(supabase_url)
            .or_else(|| normalize_text_option(lookup_env("SUPABASE_URL")))
            .or_else(|| existing.supabase_url.clone()),
        supabase_anon_key: normalize_text_option(supabase_anon_key)
            .or_else(|| normalize_text_option(lookup_env("SUPABASE_ANON_KEY")))
            .or_else(|| existing.supabase_anon_key.clone()),
        sync_interval_secs: sync_interval
            .or(env_interval)
            .or(existing.sync_interval_secs),
    };

    validate_profile(&merged)?;
    Ok(merged)
}

fn validate_profile(profile: &CliProfile) -> Result<(), CliError> {
    if profile.missing_fields().is_empty() {
        // Full validation once both required fields are present
        profile
            .remote_config()
            .normalized()
            .map_err(CliError::Config)?;
        return Ok(());
    }
    if let Some(url) = profile.supabase_url.as_deref() {
        if !tally_core::util::is_http_url(url) {
            return Err(CliError::Config(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
