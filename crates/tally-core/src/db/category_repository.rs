//! Category repository implementation

use rusqlite::{params, Connection, OptionalExtension};

use super::columns::{parse_column, sync_metadata};
use crate::error::Result;
use crate::models::{Category, CategoryId};

const CATEGORY_COLUMNS: &str = "id, name, icon, color, is_default, is_hidden, sort_order,
     created_at, sync_status, server_id, synced_at, is_deleted";

/// Trait for category storage operations
pub trait CategoryRepository {
    /// Insert or overwrite a category record, including its sync metadata
    fn put(&self, category: &Category) -> Result<()>;

    /// Get a live category by ID
    fn get(&self, id: &CategoryId) -> Result<Option<Category>>;

    /// Get a category by ID, including soft-deleted records
    fn get_any(&self, id: &CategoryId) -> Result<Option<Category>>;

    /// List live categories in display order
    fn list(&self, include_hidden: bool) -> Result<Vec<Category>>;

    /// Live, user-defined categories never acknowledged by the remote store
    fn list_local_only(&self) -> Result<Vec<Category>>;

    /// Sort position for a newly appended category
    fn next_sort_order(&self) -> Result<i64>;
}

/// `SQLite` implementation of `CategoryRepository`
pub struct SqliteCategoryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCategoryRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: parse_column(row, 0)?,
            name: row.get(1)?,
            icon: row.get(2)?,
            color: row.get(3)?,
            is_default: row.get(4)?,
            is_hidden: row.get(5)?,
            sort_order: row.get(6)?,
            created_at: row.get(7)?,
            sync: sync_metadata(row, 8)?,
            is_deleted: row.get(11)?,
        })
    }

    fn query_many(&self, sql: &str) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(sql)?;
        let categories = stmt
            .query_map([], Self::parse_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }
}

impl CategoryRepository for SqliteCategoryRepository<'_> {
    fn put(&self, category: &Category) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO categories ({CATEGORY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    name = ?2, icon = ?3, color = ?4, is_default = ?5, is_hidden = ?6,
                    sort_order = ?7, created_at = ?8, sync_status = ?9, server_id = ?10,
                    synced_at = ?11, is_deleted = ?12"
            ),
            params![
                category.id.as_str(),
                category.name,
                category.icon,
                category.color,
                category.is_default,
                category.is_hidden,
                category.sort_order,
                category.created_at,
                category.sync.status.as_str(),
                category.sync.server_id,
                category.sync.synced_at,
                category.is_deleted,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &CategoryId) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ? AND is_deleted = 0"
                ),
                params![id.as_str()],
                Self::parse_category,
            )
            .optional()?;
        Ok(category)
    }

    fn get_any(&self, id: &CategoryId) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?"),
                params![id.as_str()],
                Self::parse_category,
            )
            .optional()?;
        Ok(category)
    }

    fn list(&self, include_hidden: bool) -> Result<Vec<Category>> {
        let hidden_filter = if include_hidden {
            ""
        } else {
            "AND is_hidden = 0"
        };
        self.query_many(&format!(
            "SELECT {CATEGORY_COLUMNS}
             FROM categories
             WHERE is_deleted = 0 {hidden_filter}
             ORDER BY sort_order ASC, name ASC"
        ))
    }

    fn list_local_only(&self) -> Result<Vec<Category>> {
        self.query_many(&format!(
            "SELECT {CATEGORY_COLUMNS}
             FROM categories
             WHERE server_id IS NULL AND is_default = 0 AND is_deleted = 0
             ORDER BY sort_order ASC"
        ))
    }

    fn next_sort_order(&self) -> Result<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM categories",
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }
}
