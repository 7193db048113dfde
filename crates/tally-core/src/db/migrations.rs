//! Database migrations

use crate::error::Result;
use crate::models::{default_categories, CategoryId, DEFAULT_CATEGORIES};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: entity tables plus the sync queue and checkpoint
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            category_id TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurring_frequency TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            server_id TEXT,
            synced_at INTEGER,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date DESC);
        CREATE INDEX IF NOT EXISTS idx_expenses_deleted ON expenses(is_deleted);

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            icon TEXT NOT NULL,
            color TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            server_id TEXT,
            synced_at INTEGER,
            is_deleted INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_categories_sort ON categories(sort_order);

        CREATE TABLE IF NOT EXISTS preferences (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            date_format TEXT NOT NULL,
            default_currency TEXT NOT NULL,
            theme TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            server_id TEXT,
            synced_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            operation TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE (table_name, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp);

        CREATE TABLE IF NOT EXISTS sync_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_sync_at INTEGER,
            user_id TEXT
        );

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: seed the default categories
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    seed_default_categories(&tx)?;
    tx.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    tx.commit()?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}

/// Migration to version 3: built-in categories take name-derived ids, and
/// expenses and queued payloads that referenced the old ids follow them.
fn migrate_v3(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    for (name, _, _) in DEFAULT_CATEGORIES {
        let old_id: Option<String> = tx
            .query_row(
                "SELECT id FROM categories WHERE is_default = 1 AND name = ?",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(old_id) = old_id else {
            continue;
        };
        let new_id = CategoryId::for_default(name).as_str();
        if old_id == new_id {
            continue;
        }

        tx.execute(
            "UPDATE categories SET id = ? WHERE id = ?",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE expenses SET category_id = ? WHERE category_id = ?",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE sync_queue SET payload = REPLACE(payload, ?1, ?2)
             WHERE table_name = 'expenses' AND INSTR(payload, ?1) > 0",
            params![old_id, new_id],
        )?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (3)", [])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

fn seed_default_categories(tx: &Transaction<'_>) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO categories (id, name, icon, color, is_default, is_hidden, sort_order, created_at)
         VALUES (?, ?, ?, ?, 1, 0, ?, ?)",
    )?;
    for category in default_categories() {
        stmt.execute(params![
            category.id.as_str(),
            category.name,
            category.icon,
            category.color,
            category.sort_order,
            category.created_at
        ])?;
    }
    Ok(())
}
