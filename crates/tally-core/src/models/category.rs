//! Category model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{CategoryId, SyncMetadata};
use crate::error::{Error, Result};

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("Invalid regex"));

/// An expense category.
///
/// Categories carry no client-side `updated_at`; pull resolves conflicts on
/// them by sync status instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: String,
    /// `#rrggbb`
    pub color: String,
    /// Seeded on first open; never deleted and never force-marked pending
    pub is_default: bool,
    pub is_hidden: bool,
    pub sort_order: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    #[serde(default)]
    pub sync: SyncMetadata,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Fields supplied when creating a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// Partial edit of a category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_hidden: Option<bool>,
    pub sort_order: Option<i64>,
}

impl Category {
    /// Create a user-defined category
    pub fn new(input: NewCategory, sort_order: i64) -> Result<Self> {
        let category = Self {
            id: CategoryId::new(),
            name: input.name.trim().to_string(),
            icon: input.icon.trim().to_string(),
            color: input.color.trim().to_string(),
            is_default: false,
            is_hidden: false,
            sort_order: input.sort_order.unwrap_or(sort_order),
            created_at: chrono::Utc::now().timestamp_millis(),
            sync: SyncMetadata::pending(),
            is_deleted: false,
        };
        category.validate()?;
        Ok(category)
    }

    pub fn apply(&mut self, update: CategoryUpdate) -> Result<()> {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(icon) = update.icon {
            self.icon = icon.trim().to_string();
        }
        if let Some(color) = update.color {
            self.color = color.trim().to_string();
        }
        if let Some(is_hidden) = update.is_hidden {
            self.is_hidden = is_hidden;
        }
        if let Some(sort_order) = update.sort_order {
            self.sort_order = sort_order;
        }
        self.validate()?;
        self.sync.status = super::SyncStatus::Pending;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidInput("category name cannot be empty".into()));
        }
        if !is_hex_color(&self.color) {
            return Err(Error::InvalidInput(format!(
                "category color must be #rrggbb, got '{}'",
                self.color
            )));
        }
        Ok(())
    }
}

#[must_use]
pub fn is_hex_color(value: &str) -> bool {
    HEX_COLOR.is_match(value)
}

/// Built-in categories as `(name, icon, color)`, in display order
pub const DEFAULT_CATEGORIES: [(&str, &str, &str); 8] = [
        ("Food & Dining", "utensils", "#ef4444"),
        ("Transportation", "car", "#f97316"),
        ("Shopping", "shopping-bag", "#eab308"),
        ("Entertainment", "film", "#22c55e"),
        ("Bills & Utilities", "receipt", "#3b82f6"),
        ("Health", "heart-pulse", "#8b5cf6"),
        ("Travel", "plane", "#ec4899"),
        ("Other", "circle-ellipsis", "#6b7280"),
];

/// The categories seeded into a fresh database
#[must_use]
pub fn default_categories() -> Vec<Category> {
    let now = chrono::Utc::now().timestamp_millis();
    DEFAULT_CATEGORIES
        .iter()
        .zip(0_i64..)
        .map(|(&(name, icon, color), sort_order)| Category {
            id: CategoryId::for_default(name),
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            is_default: true,
            is_hidden: false,
            sort_order,
            created_at: now,
            sync: SyncMetadata::pending(),
            is_deleted: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color_validation() {
        assert!(is_hex_color("#00ffAA"));
        assert!(!is_hex_color("00ffaa"));
        assert!(!is_hex_color("#fff"));
    }

    #[test]
    fn new_category_is_user_defined() {
        let category = Category::new(
            NewCategory {
                name: " Pets ".to_string(),
                icon: "paw".to_string(),
                color: "#123456".to_string(),
                sort_order: None,
            },
            9,
        )
        .unwrap();
        assert_eq!(category.name, "Pets");
        assert_eq!(category.sort_order, 9);
        assert!(!category.is_default);
    }

    #[test]
    fn defaults_are_flagged_and_ordered() {
        let defaults = default_categories();
        assert_eq!(defaults.len(), 8);
        assert!(defaults.iter().all(|category| category.is_default));
        assert!(defaults.windows(2).all(|w| w[0].sort_order < w[1].sort_order));
    }

    #[test]
    fn defaults_have_the_same_ids_on_every_seed() {
        let first = default_categories();
        let second = default_categories();
        assert!(first.iter().zip(&second).all(|(a, b)| a.id == b.id));
        assert_eq!(first[0].id, CategoryId::for_default("Food & Dining"));
    }
}
