//! Data models for Tally

mod category;
mod expense;
mod id;
mod preferences;
mod sync;

pub use category::{
    default_categories, is_hex_color, Category, CategoryUpdate, NewCategory, DEFAULT_CATEGORIES,
};
pub use expense::{
    is_currency_code, normalize_currency, Expense, ExpenseUpdate, NewExpense, RecurringFrequency,
};
pub use id::{ActionId, CategoryId, ExpenseId};
pub use preferences::{Preferences, PreferencesUpdate, ThemeMode, PREFERENCES_ENTITY_ID};
pub use sync::{
    Payload, QueueItemUpdate, SyncAction, SyncMeta, SyncMetaUpdate, SyncMetadata, SyncOperation,
    SyncStatus, SyncTable,
};

/// Serialize an entity into a queue payload snapshot, without its sync annotations
pub fn entity_payload<T: serde::Serialize>(value: &T) -> crate::Result<Payload> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(mut map) => {
            map.remove("sync");
            Ok(map)
        }
        other => Err(crate::Error::InvalidInput(format!(
            "payload must serialize to an object, got {other}"
        ))),
    }
}
