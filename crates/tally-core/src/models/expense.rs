//! Expense model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CategoryId, ExpenseId, SyncMetadata};
use crate::error::{Error, Result};

/// How often a recurring expense repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurringFrequency {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for RecurringFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurringFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown recurring frequency '{other}'")),
        }
    }
}

/// An expense in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Client-generated identifier
    pub id: ExpenseId,
    pub amount: Decimal,
    /// ISO 4217 code, e.g. `USD`
    pub currency: String,
    pub category_id: CategoryId,
    pub description: String,
    pub date: NaiveDate,
    pub is_recurring: bool,
    pub recurring_frequency: Option<RecurringFrequency>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local update timestamp (Unix ms), used for last-write-wins on pull
    pub updated_at: i64,
    #[serde(default)]
    pub sync: SyncMetadata,
    /// Soft delete flag for sync
    #[serde(default)]
    pub is_deleted: bool,
}

/// Fields supplied when recording a new expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub amount: Decimal,
    pub currency: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_frequency: Option<RecurringFrequency>,
}

/// Partial edit of an expense. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseUpdate {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category_id: Option<CategoryId>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub is_recurring: Option<bool>,
    pub recurring_frequency: Option<Option<RecurringFrequency>>,
}

impl Expense {
    /// Create a new expense from user input
    pub fn new(input: NewExpense) -> Result<Self> {
        let now = chrono::Utc::now().timestamp_millis();
        let expense = Self {
            id: ExpenseId::new(),
            amount: input.amount,
            currency: normalize_currency(&input.currency),
            category_id: input.category_id,
            description: input.description.trim().to_string(),
            date: input.date,
            is_recurring: input.is_recurring,
            recurring_frequency: input.recurring_frequency,
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::pending(),
            is_deleted: false,
        };
        expense.validate()?;
        Ok(expense)
    }

    /// Apply an edit, bumping `updated_at` and marking the record pending
    pub fn apply(&mut self, update: ExpenseUpdate) -> Result<()> {
        if let Some(amount) = update.amount {
            self.amount = amount;
        }
        if let Some(currency) = update.currency {
            self.currency = normalize_currency(&currency);
        }
        if let Some(category_id) = update.category_id {
            self.category_id = category_id;
        }
        if let Some(description) = update.description {
            self.description = description.trim().to_string();
        }
        if let Some(date) = update.date {
            self.date = date;
        }
        if let Some(is_recurring) = update.is_recurring {
            self.is_recurring = is_recurring;
            if !is_recurring {
                self.recurring_frequency = None;
            }
        }
        if let Some(frequency) = update.recurring_frequency {
            self.recurring_frequency = frequency;
        }
        self.validate()?;
        self.updated_at = chrono::Utc::now().timestamp_millis().max(self.updated_at);
        self.sync.status = super::SyncStatus::Pending;
        Ok(())
    }

    /// Check field-level invariants
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(
                "expense amount must be greater than zero".into(),
            ));
        }
        if !is_currency_code(&self.currency) {
            return Err(Error::InvalidInput(format!(
                "invalid currency code '{}'",
                self.currency
            )));
        }
        if self.is_recurring && self.recurring_frequency.is_none() {
            return Err(Error::InvalidInput(
                "recurring expenses need a frequency".into(),
            ));
        }
        Ok(())
    }
}

/// Uppercase and trim a currency code
#[must_use]
pub fn normalize_currency(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Whether `code` looks like an ISO 4217 currency code
#[must_use]
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|byte| byte.is_ascii_uppercase())
}
