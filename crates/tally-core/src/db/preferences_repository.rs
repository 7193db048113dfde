//! Preferences repository implementation

use rusqlite::{params, Connection, OptionalExtension};

use super::columns::{parse_column, sync_metadata};
use crate::error::Result;
use crate::models::Preferences;

/// Trait for preferences storage operations
pub trait PreferencesRepository {
    /// Load the stored preferences, if any were ever saved
    fn load(&self) -> Result<Option<Preferences>>;

    /// Save preferences, including sync metadata
    fn save(&self, preferences: &Preferences) -> Result<()>;
}

/// `SQLite` implementation of `PreferencesRepository`
pub struct SqlitePreferencesRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePreferencesRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl PreferencesRepository for SqlitePreferencesRepository<'_> {
    fn load(&self) -> Result<Option<Preferences>> {
        let preferences = self
            .conn
            .query_row(
                "SELECT date_format, default_currency, theme, updated_at,
                        sync_status, server_id, synced_at
                 FROM preferences WHERE id = 1",
                [],
                |row| {
                    Ok(Preferences {
                        date_format: row.get(0)?,
                        default_currency: row.get(1)?,
                        theme: parse_column(row, 2)?,
                        updated_at: row.get(3)?,
                        sync: sync_metadata(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(preferences)
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO preferences
                (id, date_format, default_currency, theme, updated_at, sync_status, server_id, synced_at)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?)",
            params![
                preferences.date_format,
                preferences.default_currency,
                preferences.theme.as_str(),
                preferences.updated_at,
                preferences.sync.status.as_str(),
                preferences.sync.server_id,
                preferences.sync.synced_at,
            ],
        )?;
        Ok(())
    }
}
