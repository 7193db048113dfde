//! Row decoding helpers shared by the repositories

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;

use crate::models::{SyncMetadata, SyncStatus};

/// Read a TEXT column and parse it with `FromStr`
pub fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("failed to parse '{raw}': {error}").into(),
        )
    })
}

/// Read an optional TEXT column and parse it with `FromStr`
pub fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse::<T>().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("failed to parse '{raw}': {error}").into(),
            )
        })
    })
    .transpose()
}

/// Decode the `sync_status, server_id, synced_at` triple starting at `idx`
pub fn sync_metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<SyncMetadata> {
    Ok(SyncMetadata {
        status: parse_column::<SyncStatus>(row, idx)?,
        server_id: row.get(idx + 1)?,
        synced_at: row.get(idx + 2)?,
    })
}
