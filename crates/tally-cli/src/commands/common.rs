use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::config::RemoteConfig;
use tally_core::models::RecurringFrequency;
use tally_core::remote::SupabaseRemoteStore;
use tally_core::{Category, CategoryId, DatabaseService, Expense, ExpenseId, SyncEngine};

use crate::auth::{AuthSession, SupabaseAuthService};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub type CliSyncEngine = SyncEngine<DatabaseService, SupabaseRemoteStore>;

#[derive(Debug, Serialize)]
pub struct ExpenseListItem {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub recurring: Option<String>,
    pub sync_status: String,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tally").join("tally.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path)?)
}

pub fn list_all_expenses(db: &DatabaseService) -> Result<Vec<Expense>, CliError> {
    const PAGE_SIZE: usize = 500;

    let mut expenses = Vec::new();
    let mut offset = 0usize;

    loop {
        let batch = db.list_expenses(PAGE_SIZE, offset)?;
        let count = batch.len();
        expenses.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }

    Ok(expenses)
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyExpenseId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Look up an expense by full ID or unique ID prefix.
pub fn resolve_expense(query: &str, db: &DatabaseService) -> Result<Expense, CliError> {
    let query = normalize_identifier(query)?;
    if let Ok(id) = query.parse::<ExpenseId>() {
        if let Some(expense) = db.get_expense(&id)? {
            return Ok(expense);
        }
    }

    let mut matches = list_all_expenses(db)?
        .into_iter()
        .filter(|expense| expense.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::ExpenseNotFound(query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|expense| short_id(&expense.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Look up a category by ID, ID prefix, or case-insensitive name.
pub fn resolve_category(query: &str, db: &DatabaseService) -> Result<Category, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<CategoryId>() {
        if let Some(category) = db.get_category(&id)? {
            return Ok(category);
        }
    }

    let categories = db.list_categories(true)?;
    if let Some(category) = categories
        .iter()
        .find(|category| category.name.eq_ignore_ascii_case(query))
    {
        return Ok(category.clone());
    }

    let mut by_prefix = categories
        .into_iter()
        .filter(|category| !query.is_empty() && category.id.as_str().starts_with(query))
        .collect::<Vec<_>>();
    match by_prefix.len() {
        1 => Ok(by_prefix.remove(0)),
        0 => Err(CliError::CategoryNotFound(query.to_string())),
        _ => Err(CliError::AmbiguousId(format!(
            "Category prefix '{query}' is ambiguous"
        ))),
    }
}

/// The category for new expenses when none is given
pub fn default_category(db: &DatabaseService) -> Result<Category, CliError> {
    db.list_categories(false)?
        .into_iter()
        .next()
        .ok_or_else(|| CliError::CategoryNotFound("(no visible categories)".to_string()))
}

pub fn parse_amount(raw: &str) -> Result<Decimal, CliError> {
    Decimal::from_str(raw.trim())
        .map_err(|error| CliError::InvalidInput(format!("invalid amount '{raw}': {error}")))
}

pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, CliError> {
    match raw.map(str::trim) {
        None | Some("" | "today") => Ok(Local::now().date_naive()),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|error| {
            CliError::InvalidInput(format!("invalid date '{value}' (expected YYYY-MM-DD): {error}"))
        }),
    }
}

/// `"none"` clears the frequency
pub fn parse_frequency(raw: &str) -> Result<Option<RecurringFrequency>, CliError> {
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(CliError::InvalidInput)
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn category_names(categories: &[Category]) -> HashMap<CategoryId, String> {
    categories
        .iter()
        .map(|category| (category.id, category.name.clone()))
        .collect()
}

pub fn expense_to_list_item(
    expense: &Expense,
    names: &HashMap<CategoryId, String>,
    now_ms: i64,
) -> ExpenseListItem {
    ExpenseListItem {
        id: expense.id.to_string(),
        date: expense.date,
        amount: expense.amount,
        currency: expense.currency.clone(),
        category: names
            .get(&expense.category_id)
            .cloned()
            .unwrap_or_else(|| short_id(&expense.category_id.as_str())),
        description: expense.description.clone(),
        recurring: expense
            .recurring_frequency
            .filter(|_| expense.is_recurring)
            .map(|frequency| frequency.to_string()),
        sync_status: expense.sync.status.as_str().to_string(),
        updated_at: expense.updated_at,
        relative_time: format_relative_time(expense.updated_at, now_ms),
    }
}

pub fn format_expense_lines(
    expenses: &[Expense],
    names: &HashMap<CategoryId, String>,
) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    expenses
        .iter()
        .map(|expense| {
            let item = expense_to_list_item(expense, names, now_ms);
            let amount = format!("{} {}", item.amount, item.currency);
            let marker = if item.sync_status == "synced" {
                String::new()
            } else {
                format!("  [{}]", item.sync_status)
            };
            format!(
                "{:<13}  {}  {:>14}  {:<14}  {}{}",
                short_id(&item.id),
                item.date,
                amount,
                item.category,
                item.description,
                marker
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Everything a signed-in sync command needs.
pub struct SyncContext {
    pub profile_name: String,
    pub config: RemoteConfig,
    pub auth: SupabaseAuthService,
    pub session: AuthSession,
    pub engine: Arc<CliSyncEngine>,
}

impl SyncContext {
    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }
}

/// Resolve the profile, restore (and refresh) its session, and build an engine
/// over the local database and the Supabase REST API.
pub async fn open_sync_context(
    db_path: &Path,
    profile_override: Option<&str>,
) -> Result<SyncContext, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(profile_override);
    let profile = profiles
        .profile(&profile_name)
        .ok_or(CliError::SyncNotConfigured)?;
    let auth = SupabaseAuthService::new_for_profile(&profile_name, profile)
        .map_err(|error| CliError::Auth(error.to_string()))?
        .ok_or(CliError::SyncNotConfigured)?;
    let session = auth
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?
        .ok_or(CliError::NotSignedIn)?;

    let config = profile.remote_config();
    let engine = build_sync_engine(db_path, &config, &session)?;
    tracing::debug!("Sync enabled via profile '{}'", profile_name);

    Ok(SyncContext {
        profile_name,
        config,
        auth,
        session,
        engine,
    })
}

pub fn build_sync_engine(
    db_path: &Path,
    config: &RemoteConfig,
    session: &AuthSession,
) -> Result<Arc<CliSyncEngine>, CliError> {
    let remote = SupabaseRemoteStore::new(config, session.access_token.clone())?;
    let store = open_database(db_path)?;
    Ok(Arc::new(SyncEngine::new(Arc::new(store), Arc::new(remote))))
}
