//! User preferences model (singleton)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::expense::{is_currency_code, normalize_currency};
use super::{SyncMetadata, SyncStatus};
use crate::error::{Error, Result};

/// Queue key for the preferences singleton
pub const PREFERENCES_ENTITY_ID: &str = "preferences";

/// Theme mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
    /// Follow system preference
    #[default]
    System,
}

impl ThemeMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

/// Display preferences shared across devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// chrono format string used when rendering dates
    pub date_format: String,
    pub default_currency: String,
    pub theme: ThemeMode,
    /// Last local update timestamp (Unix ms)
    pub updated_at: i64,
    #[serde(default)]
    pub sync: SyncMetadata,
}

/// Partial edit of the preferences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencesUpdate {
    pub date_format: Option<String>,
    pub default_currency: Option<String>,
    pub theme: Option<ThemeMode>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            default_currency: "USD".to_string(),
            theme: ThemeMode::System,
            updated_at: 0,
            sync: SyncMetadata::pending(),
        }
    }
}

impl Preferences {
    pub fn apply(&mut self, update: PreferencesUpdate) -> Result<()> {
        if let Some(date_format) = update.date_format {
            self.date_format = date_format.trim().to_string();
        }
        if let Some(currency) = update.default_currency {
            self.default_currency = normalize_currency(&currency);
        }
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        self.validate()?;
        self.updated_at = chrono::Utc::now().timestamp_millis().max(self.updated_at);
        self.sync.status = SyncStatus::Pending;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.date_format.is_empty() {
            return Err(Error::InvalidInput("date format cannot be empty".into()));
        }
        if !is_currency_code(&self.default_currency) {
            return Err(Error::InvalidInput(format!(
                "invalid currency code '{}'",
                self.default_currency
            )));
        }
        Ok(())
    }
}
