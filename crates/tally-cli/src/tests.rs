use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use tally_core::models::{ExpenseUpdate, NewExpense, RecurringFrequency};
use tally_core::sync::{LocalStore, PulledCounts};
use tally_core::{CategoryId, DatabaseService, SyncResult};

use crate::commands::common::{
    default_category, format_relative_time, parse_amount, parse_date, parse_frequency,
    resolve_category, resolve_expense, short_id,
};
use crate::auth::{load_stored_session, save_stored_session, AuthError, AuthSession};
use crate::commands::auth_cmd::logout_profile;
use crate::commands::config::merge_profile;
use crate::commands::edit::{build_update, EditArgs};
use crate::commands::import::{parse_import, resolve_rows};
use crate::commands::sync::{format_sync_result, reset_sync_state, sync_status_report};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn temp_db() -> (tempfile::TempDir, DatabaseService) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("tally.db");
    let db = DatabaseService::open_path(path).unwrap();
    (dir, db)
}

fn add_expense(db: &DatabaseService, description: &str) -> tally_core::Expense {
    let category = default_category(db).unwrap();
    db.create_expense(NewExpense {
        amount: Decimal::new(1250, 2),
        currency: "USD".to_string(),
        category_id: category.id,
        description: description.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        is_recurring: false,
        recurring_frequency: None,
    })
    .unwrap()
}

#[test]
fn parse_amount_accepts_decimals_and_trims() {
    assert_eq!(parse_amount(" 12.50 ").unwrap(), Decimal::new(1250, 2));
    assert!(matches!(
        parse_amount("twelve"),
        Err(CliError::InvalidInput(_))
    ));
}

#[test]
fn parse_date_defaults_to_today() {
    let today = Local::now().date_naive();
    assert_eq!(parse_date(None).unwrap(), today);
    assert_eq!(parse_date(Some("today")).unwrap(), today);
    assert_eq!(
        parse_date(Some("2024-02-29")).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert!(parse_date(Some("29/02/2024")).is_err());
}

#[test]
fn parse_frequency_none_clears() {
    assert_eq!(parse_frequency("none").unwrap(), None);
    assert_eq!(
        parse_frequency("monthly").unwrap(),
        Some(RecurringFrequency::Monthly)
    );
    assert!(parse_frequency("fortnightly").is_err());
}

#[test]
fn format_relative_time_buckets() {
    let now = 10_000_000_000_i64;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
    assert_eq!(format_relative_time(now - 14 * 86_400_000, now), "2w ago");
    // Future timestamps clamp to zero
    assert_eq!(format_relative_time(now + 60_000, now), "just now");
}

#[test]
fn resolve_expense_by_full_id_and_prefix() {
    let (_dir, db) = temp_db();
    let expense = add_expense(&db, "Coffee");
    let id = expense.id.as_str();

    assert_eq!(resolve_expense(&id, &db).unwrap().id, expense.id);
    assert_eq!(resolve_expense(&id[..20], &db).unwrap().id, expense.id);
    assert!(matches!(
        resolve_expense("ffffffff", &db),
        Err(CliError::ExpenseNotFound(_))
    ));
    assert!(matches!(
        resolve_expense("   ", &db),
        Err(CliError::EmptyExpenseId)
    ));
}

#[test]
fn resolve_expense_rejects_ambiguous_prefix() {
    let (_dir, db) = temp_db();
    let first = add_expense(&db, "Coffee");
    add_expense(&db, "Tea");

    // UUIDv7 ids lead with their creation timestamp
    let prefix = &first.id.as_str()[..4];
    assert!(matches!(
        resolve_expense(prefix, &db),
        Err(CliError::AmbiguousId(_))
    ));
}

#[test]
fn resolve_category_by_name_ignores_case() {
    let (_dir, db) = temp_db();
    let category = resolve_category("food & dining", &db).unwrap();
    assert_eq!(category.name, "Food & Dining");
    assert_eq!(
        resolve_category(&category.id.as_str(), &db).unwrap().id,
        category.id
    );
    assert!(matches!(
        resolve_category("Yachts", &db),
        Err(CliError::CategoryNotFound(_))
    ));
}

#[test]
fn build_update_only_sets_given_fields() {
    let category_id = CategoryId::new();
    let update = build_update(
        &EditArgs {
            amount: Some("3.10"),
            description: Some("  Bus ticket "),
            ..EditArgs::default()
        },
        |_| Ok(category_id),
    )
    .unwrap();

    assert_eq!(
        update,
        ExpenseUpdate {
            amount: Some(Decimal::new(310, 2)),
            description: Some("Bus ticket".to_string()),
            ..ExpenseUpdate::default()
        }
    );
}

#[test]
fn build_update_recurring_none_turns_recurrence_off() {
    let update = build_update(
        &EditArgs {
            recurring: Some("none"),
            ..EditArgs::default()
        },
        |_| Ok(CategoryId::new()),
    )
    .unwrap();

    assert_eq!(update.is_recurring, Some(false));
    assert_eq!(update.recurring_frequency, Some(None));
}

#[test]
fn import_rows_resolve_categories_and_default_currency() {
    let (_dir, db) = temp_db();
    let rows = parse_import(
        r#"[
            {"amount": 4.5, "category": "Transportation", "description": "Metro", "date": "2024-05-02"},
            {"amount": 60, "currency": "EUR", "category": "health", "date": "2024-05-03", "recurring_frequency": "monthly"}
        ]"#,
    )
    .unwrap();

    let inputs = resolve_rows(rows, &db).unwrap();
    let default_currency = db.preferences().unwrap().default_currency;
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0].currency, default_currency);
    assert_eq!(inputs[1].currency, "EUR");
    assert!(inputs[1].is_recurring);

    let imported = db.import_expenses(inputs).unwrap();
    assert_eq!(imported.len(), 2);
    assert_eq!(db.queue_count().unwrap(), 2);
}

#[test]
fn import_reports_row_number_for_unknown_category() {
    let (_dir, db) = temp_db();
    let rows = parse_import(
        r#"[
            {"amount": 1, "category": "Other", "date": "2024-05-02"},
            {"amount": 2, "category": "Nope", "date": "2024-05-02"}
        ]"#,
    )
    .unwrap();

    let error = resolve_rows(rows, &db).unwrap_err().to_string();
    assert!(error.contains("row 2"), "{error}");
}

#[test]
fn import_rejects_unknown_fields() {
    assert!(parse_import(r#"[{"amount": 1, "category": "Other", "date": "2024-05-02", "tip": 1}]"#).is_err());
}

#[test]
fn format_sync_result_summarizes_counts() {
    let result = SyncResult {
        success: true,
        pushed: 3,
        failed: 1,
        pulled: PulledCounts {
            expenses: 2,
            categories: 1,
            preferences: 0,
        },
        last_sync_at: None,
        ..SyncResult::default()
    };

    assert_eq!(
        format_sync_result(&result),
        vec![
            "Pushed 3, pulled 3 (expenses 2, categories 1, preferences 0)".to_string(),
            "1 change(s) could not be synced".to_string(),
        ]
    );

    let skipped = SyncResult {
        skipped: true,
        ..SyncResult::default()
    };
    assert_eq!(format_sync_result(&skipped).len(), 1);
}

#[test]
fn reset_sync_state_clears_queue_but_keeps_expenses() {
    let (_dir, db) = temp_db();
    let expense = add_expense(&db, "Lunch");

    let before = sync_status_report(&db).unwrap();
    assert_eq!(before.pending, 1);
    assert_eq!(before.queue[0].entity_id, expense.id.as_str());

    reset_sync_state(&db).unwrap();
    let after = sync_status_report(&db).unwrap();
    assert_eq!(after.pending, 0);
    assert_eq!(after.last_sync_at, None);
    assert_eq!(after.user_id, None);
    assert!(resolve_expense(&expense.id.as_str(), &db).is_ok());
}

#[test]
fn short_id_truncates() {
    assert_eq!(short_id("0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b"), "0190a1b2-c3d4");
    assert_eq!(short_id("abc"), "abc");
}

#[test]
fn merge_profile_prefers_flags_then_env_then_existing() {
    let existing = CliProfile {
        supabase_url: Some("https://old.supabase.co".to_string()),
        supabase_anon_key: Some("old-key".to_string()),
        sync_interval_secs: Some(120),
    };
    let env = HashMap::from([("SUPABASE_ANON_KEY", "env-key")]);

    let merged = merge_profile(
        &existing,
        Some("https://new.supabase.co".to_string()),
        None,
        None,
        |name| env.get(name).map(ToString::to_string),
    )
    .unwrap();

    assert_eq!(
        merged,
        CliProfile {
            supabase_url: Some("https://new.supabase.co".to_string()),
            supabase_anon_key: Some("env-key".to_string()),
            sync_interval_secs: Some(120),
        }
    );
}

#[test]
fn merge_profile_rejects_bad_url_and_short_interval() {
    let no_env = |_: &str| None;
    assert!(matches!(
        merge_profile(
            &CliProfile::default(),
            Some("project.supabase.co".to_string()),
            None,
            None,
            no_env
        ),
        Err(CliError::Config(_))
    ));
    assert!(matches!(
        merge_profile(
            &CliProfile::default(),
            Some("https://project.supabase.co".to_string()),
            Some("key".to_string()),
            Some(1),
            no_env
        ),
        Err(CliError::Config(_))
    ));
}

#[tokio::test]
async fn logout_clears_local_state_when_remote_revoke_fails() {
    let (_dir, db) = temp_db();
    let expense = add_expense(&db, "Taxi");
    let profile = "logout-offline";
    save_stored_session(
        profile,
        &AuthSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 1_700_000_000,
            user: tally_core::auth::AuthUser {
                id: "user-1".to_string(),
                email: None,
            },
        },
    )
    .unwrap();

    let revoke = async { Err::<(), _>(AuthError::Api("503 Service Unavailable".to_string())) };
    logout_profile(profile, Some(revoke), &db).await.unwrap();

    assert!(load_stored_session(profile).unwrap().is_none());
    assert_eq!(sync_status_report(&db).unwrap().pending, 0);
    assert!(resolve_expense(&expense.id.as_str(), &db).is_ok());
}
