//! Remote sync configuration.
//!
//! `RemoteConfig` holds the public Supabase endpoint and anon key plus the
//! periodic sync interval. Secret credentials never live here; session tokens
//! come from the auth flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const MIN_SYNC_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_anon_key: String,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

impl RemoteConfig {
    /// Trim fields, strip trailing slashes from the URL, and validate.
    pub fn normalized(self) -> Result<Self, String> {
        let supabase_url = normalize_text_option(Some(self.supabase_url))
            .ok_or_else(|| "supabase_url is required".to_string())?;
        if !is_http_url(&supabase_url) {
            return Err("supabase_url must include http:// or https://".to_string());
        }
        let supabase_anon_key = normalize_text_option(Some(self.supabase_anon_key))
            .ok_or_else(|| "supabase_anon_key is required".to_string())?;
        if self.sync_interval_secs < MIN_SYNC_INTERVAL_SECS {
            return Err(format!(
                "sync_interval_secs must be at least {MIN_SYNC_INTERVAL_SECS}"
            ));
        }

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            sync_interval_secs: self.sync_interval_secs,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.clone().normalized().is_ok()
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
