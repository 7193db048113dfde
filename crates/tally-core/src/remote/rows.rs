//! Typed row schemas for the remote tables.
//!
//! Rows are validated before they are sent and after they are received, so a
//! malformed snapshot never reaches the network and a malformed remote row
//! never reaches the local store.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteResult};
use crate::models::{
    is_currency_code, is_hex_color, Category, CategoryId, Expense, ExpenseId, Preferences,
    RecurringFrequency, SyncAction, SyncMetadata, SyncTable, ThemeMode,
};
use crate::util::{datetime_from_millis, millis_from_datetime};

/// Remote table backing a sync table
#[must_use]
pub const fn remote_table_name(table: SyncTable) -> &'static str {
    match table {
        SyncTable::Expenses => "expenses",
        SyncTable::Categories => "categories",
        SyncTable::Preferences => "user_preferences",
    }
}

fn invalid(message: impl Into<String>) -> RemoteError {
    RemoteError::InvalidRow(message.into())
}

fn require_owner(user_id: &str) -> RemoteResult<()> {
    if user_id.trim().is_empty() {
        return Err(invalid("user_id must not be empty"));
    }
    Ok(())
}

/// One row of the remote `expenses` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRow {
    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub local_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// Local id of the expense's category
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_frequency: Option<RecurringFrequency>,
    pub created_at: DateTime<Utc>,
    /// Maintained by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ExpenseRow {
    pub fn from_expense(user_id: &str, expense: &Expense) -> RemoteResult<Self> {
        Ok(Self {
            id: None,
            user_id: user_id.to_string(),
            local_id: expense.id.as_str(),
            amount: expense.amount,
            currency: expense.currency.clone(),
            category: expense.category_id.as_str(),
            description: expense.description.clone(),
            date: expense.date,
            is_recurring: expense.is_recurring,
            recurring_frequency: expense.recurring_frequency,
            created_at: datetime_from_millis(expense.created_at)
                .ok_or_else(|| invalid("created_at out of range"))?,
            updated_at: None,
            deleted_at: None,
        })
    }

    pub fn validate(&self) -> RemoteResult<()> {
        require_owner(&self.user_id)?;
        self.local_id
            .parse::<ExpenseId>()
            .map_err(|error| invalid(format!("expense local_id: {error}")))?;
        self.category
            .parse::<CategoryId>()
            .map_err(|error| invalid(format!("expense category: {error}")))?;
        if self.amount <= Decimal::ZERO {
            return Err(invalid("expense amount must be positive"));
        }
        if !is_currency_code(&self.currency) {
            return Err(invalid(format!("invalid currency '{}'", self.currency)));
        }
        if self.is_recurring && self.recurring_frequency.is_none() {
            return Err(invalid("recurring expense without frequency"));
        }
        Ok(())
    }

    /// Convert a pulled row into a synced local record
    pub fn into_expense(self, pulled_at: i64) -> RemoteResult<Expense> {
        self.validate()?;
        let updated_at = self
            .updated_at
            .ok_or_else(|| invalid("pulled expense without updated_at"))?;
        let server_id = self
            .id
            .ok_or_else(|| invalid("pulled expense without id"))?;

        Ok(Expense {
            id: self.local_id.parse().map_err(|_| invalid("local_id"))?,
            amount: self.amount,
            currency: self.currency,
            category_id: self.category.parse().map_err(|_| invalid("category"))?,
            description: self.description,
            date: self.date,
            is_recurring: self.is_recurring,
            recurring_frequency: self.recurring_frequency,
            created_at: millis_from_datetime(self.created_at),
            updated_at: millis_from_datetime(updated_at),
            sync: SyncMetadata::synced(server_id, pulled_at),
            is_deleted: self.deleted_at.is_some(),
        })
    }
}

/// One row of the remote `categories` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub local_id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CategoryRow {
    pub fn from_category(user_id: &str, category: &Category) -> RemoteResult<Self> {
        Ok(Self {
            id: None,
            user_id: user_id.to_string(),
            local_id: category.id.as_str(),
            name: category.name.clone(),
            icon: category.icon.clone(),
            color: category.color.clone(),
            is_default: category.is_default,
            is_hidden: category.is_hidden,
            sort_order: category.sort_order,
            created_at: datetime_from_millis(category.created_at)
                .ok_or_else(|| invalid("created_at out of range"))?,
            updated_at: None,
            deleted_at: None,
        })
    }

    pub fn validate(&self) -> RemoteResult<()> {
        require_owner(&self.user_id)?;
        self.local_id
            .parse::<CategoryId>()
            .map_err(|error| invalid(format!("category local_id: {error}")))?;
        if self.name.trim().is_empty() {
            return Err(invalid("category name must not be empty"));
        }
        if !is_hex_color(&self.color) {
            return Err(invalid(format!("invalid category color '{}'", self.color)));
        }
        Ok(())
    }

    pub fn into_category(self, pulled_at: i64) -> RemoteResult<Category> {
        self.validate()?;
        let server_id = self
            .id
            .ok_or_else(|| invalid("pulled category without id"))?;

        Ok(Category {
            id: self.local_id.parse().map_err(|_| invalid("local_id"))?,
            name: self.name,
            icon: self.icon,
            color: self.color,
            is_default: self.is_default,
            is_hidden: self.is_hidden,
            sort_order: self.sort_order,
            created_at: millis_from_datetime(self.created_at),
            sync: SyncMetadata::synced(server_id, pulled_at),
            is_deleted: self.deleted_at.is_some(),
        })
    }
}

/// The remote `user_preferences` row (one per user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub date_format: String,
    pub default_currency: String,
    pub theme: ThemeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PreferencesRow {
    #[must_use]
    pub fn from_preferences(user_id: &str, preferences: &Preferences) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            date_format: preferences.date_format.clone(),
            default_currency: preferences.default_currency.clone(),
            theme: preferences.theme,
            updated_at: None,
        }
    }

    pub fn validate(&self) -> RemoteResult<()> {
        require_owner(&self.user_id)?;
        if self.date_format.trim().is_empty() {
            return Err(invalid("date_format must not be empty"));
        }
        if !is_currency_code(&self.default_currency) {
            return Err(invalid(format!(
                "invalid default currency '{}'",
                self.default_currency
            )));
        }
        Ok(())
    }

    pub fn into_preferences(self, pulled_at: i64) -> RemoteResult<Preferences> {
        self.validate()?;
        let server_id = self
            .id
            .ok_or_else(|| invalid("pulled preferences without id"))?;

        Ok(Preferences {
            date_format: self.date_format,
            default_currency: self.default_currency,
            theme: self.theme,
            updated_at: self.updated_at.map_or(pulled_at, millis_from_datetime),
            sync: SyncMetadata::synced(server_id, pulled_at),
        })
    }
}

/// A row bound for the remote store, tagged by table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum RemoteRecord {
    Expenses(ExpenseRow),
    Categories(CategoryRow),
    UserPreferences(PreferencesRow),
}

impl RemoteRecord {
    /// Build the upsert row for a queued `create`/`update` action
    pub fn from_action(user_id: &str, action: &SyncAction) -> RemoteResult<Self> {
        let snapshot = serde_json::Value::Object(action.payload.clone());
        let record = match action.table {
            SyncTable::Expenses => {
                let expense: Expense = serde_json::from_value(snapshot)?;
                Self::Expenses(ExpenseRow::from_expense(user_id, &expense)?)
            }
            SyncTable::Categories => {
                let category: Category = serde_json::from_value(snapshot)?;
                Self::Categories(CategoryRow::from_category(user_id, &category)?)
            }
            SyncTable::Preferences => {
                let preferences: Preferences = serde_json::from_value(snapshot)?;
                Self::UserPreferences(PreferencesRow::from_preferences(user_id, &preferences))
            }
        };
        record.validate()?;
        Ok(record)
    }

    #[must_use]
    pub const fn table(&self) -> SyncTable {
        match self {
            Self::Expenses(_) => SyncTable::Expenses,
            Self::Categories(_) => SyncTable::Categories,
            Self::UserPreferences(_) => SyncTable::Preferences,
        }
    }

    pub fn validate(&self) -> RemoteResult<()> {
        match self {
            Self::Expenses(row) => row.validate(),
            Self::Categories(row) => row.validate(),
            Self::UserPreferences(row) => row.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{entity_payload, NewExpense, SyncOperation};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn expense() -> Expense {
        Expense::new(NewExpense {
            amount: dec!(19.99),
            currency: "EUR".to_string(),
            category_id: CategoryId::new(),
            description: "Books".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            is_recurring: true,
            recurring_frequency: Some(RecurringFrequency::Monthly),
        })
        .unwrap()
    }

    #[test]
    fn record_from_action_carries_local_identity() {
        let expense = expense();
        let action = SyncAction::new(
            SyncTable::Expenses,
            SyncOperation::Create,
            expense.id.as_str(),
            entity_payload(&expense).unwrap(),
        );

        let record = RemoteRecord::from_action("user-1", &action).unwrap();
        assert_eq!(record.table(), SyncTable::Expenses);
        let RemoteRecord::Expenses(row) = record else {
            panic!("expected an expense row");
        };
        assert_eq!(row.local_id, expense.id.as_str());
        assert_eq!(row.category, expense.category_id.as_str());
        assert_eq!(row.amount, dec!(19.99));
        assert_eq!(row.user_id, "user-1");
    }

    #[test]
    fn record_rejects_missing_owner() {
        let expense = expense();
        let action = SyncAction::new(
            SyncTable::Expenses,
            SyncOperation::Update,
            expense.id.as_str(),
            entity_payload(&expense).unwrap(),
        );
        assert!(matches!(
            RemoteRecord::from_action(" ", &action),
            Err(RemoteError::InvalidRow(_))
        ));
    }

    #[test]
    fn record_rejects_partial_snapshot() {
        let mut payload = crate::models::Payload::new();
        payload.insert("amount".into(), serde_json::json!(3));
        let action = SyncAction::new(SyncTable::Expenses, SyncOperation::Update, "x", payload);
        assert!(matches!(
            RemoteRecord::from_action("user-1", &action),
            Err(RemoteError::InvalidRow(_))
        ));
    }

    #[test]
    fn pulled_row_becomes_synced_expense() {
        let local = expense();
        let mut row = ExpenseRow::from_expense("user-1", &local).unwrap();
        row.id = Some("srv-9".to_string());
        row.updated_at = datetime_from_millis(local.updated_at + 500);

        let pulled = row.into_expense(42).unwrap();
        assert_eq!(pulled.id, local.id);
        assert_eq!(pulled.updated_at, local.updated_at + 500);
        assert_eq!(pulled.sync, SyncMetadata::synced("srv-9".to_string(), 42));
        assert!(!pulled.is_deleted);
    }

    #[test]
    fn pulled_row_requires_server_timestamp() {
        let mut row = ExpenseRow::from_expense("user-1", &expense()).unwrap();
        row.id = Some("srv-9".to_string());
        assert!(matches!(row.into_expense(1), Err(RemoteError::InvalidRow(_))));
    }

    #[test]
    fn tombstoned_category_row_is_deleted_locally() {
        let row: CategoryRow = serde_json::from_value(serde_json::json!({
            "id": "c-1",
            "user_id": "user-1",
            "local_id": CategoryId::new().as_str(),
            "name": "Pets",
            "icon": "paw",
            "color": "#aabbcc",
            "sort_order": 3,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "deleted_at": "2026-01-02T00:00:00Z"
        }))
        .unwrap();

        let category = row.into_category(7).unwrap();
        assert!(category.is_deleted);
        assert_eq!(category.sort_order, 3);
    }

    #[test]
    fn record_is_tagged_by_table() {
        let row = PreferencesRow::from_preferences("user-1", &Preferences::default());
        let json = serde_json::to_value(RemoteRecord::UserPreferences(row)).unwrap();
        assert_eq!(json["table"], "user_preferences");
        assert_eq!(json["row"]["theme"], "system");
    }
}
