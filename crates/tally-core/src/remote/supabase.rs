//! `RemoteStore` over Supabase's PostgREST endpoint.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::rows::remote_table_name;
use super::{
    CategoryRow, ExpenseRow, PreferencesRow, RemoteError, RemoteResult, RemoteStore,
};
use crate::config::RemoteConfig;
use crate::models::SyncTable;
use crate::util::describe_api_error;

const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=representation";
/// PostgREST answers a single-object request that matched nothing with 406
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct SupabaseRemoteStore {
    rest_url: String,
    anon_key: String,
    access_token: RwLock<String>,
    client: Client,
}

impl std::fmt::Debug for SupabaseRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseRemoteStore")
            .field("rest_url", &self.rest_url)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ReturnedRow {
    id: serde_json::Value,
}

impl SupabaseRemoteStore {
    pub fn new(config: &RemoteConfig, access_token: impl Into<String>) -> RemoteResult<Self> {
        let config = config
            .clone()
            .normalized()
            .map_err(RemoteError::InvalidConfiguration)?;
        Ok(Self {
            rest_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.supabase_anon_key,
            access_token: RwLock::new(access_token.into()),
            client: Client::builder().build()?,
        })
    }

    /// Swap in a refreshed access token
    pub fn set_access_token(&self, access_token: impl Into<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = access_token.into();
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }

    fn table_url(&self, table: SyncTable) -> String {
        format!("{}/{}", self.rest_url, remote_table_name(table))
    }

    async fn checked(response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::NOT_ACCEPTABLE {
            return Err(RemoteError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Api(describe_api_error(status, &body)))
    }

    async fn upsert<T: Serialize + Sync>(
        &self,
        table: SyncTable,
        on_conflict: &str,
        row: &T,
    ) -> RemoteResult<String> {
        let request = self.authorized(
            self.client
                .post(self.table_url(table))
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", UPSERT_PREFERENCE)
                .json(row),
        );
        let response = Self::checked(request.send().await?).await?;
        let rows = response.json::<Vec<ReturnedRow>>().await?;
        let returned = rows.into_iter().next().ok_or_else(|| {
            RemoteError::InvalidRow(format!("upsert into {table} returned no rows"))
        })?;

        match returned.id {
            serde_json::Value::String(id) => Ok(id),
            serde_json::Value::Number(id) => Ok(id.to_string()),
            other => Err(RemoteError::InvalidRow(format!(
                "unexpected id {other} from {table}"
            ))),
        }
    }

    async fn fetch<T: DeserializeOwned + Send>(
        &self,
        table: SyncTable,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<T>> {
        let request = self.authorized(
            self.client
                .get(self.table_url(table))
                .query(&owner_filter(user_id, since))
                .query(&[("order", "updated_at.asc")]),
        );
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json::<Vec<T>>().await?)
    }
}

fn owner_filter(user_id: &str, since: Option<DateTime<Utc>>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{user_id}")),
    ];
    if let Some(since) = since {
        query.push((
            "updated_at",
            format!("gt.{}", since.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ));
    }
    query
}

impl RemoteStore for SupabaseRemoteStore {
    async fn upsert_expense(&self, row: &ExpenseRow) -> RemoteResult<String> {
        row.validate()?;
        self.upsert(SyncTable::Expenses, "user_id,local_id", row)
            .await
    }

    async fn upsert_category(&self, row: &CategoryRow) -> RemoteResult<String> {
        row.validate()?;
        self.upsert(SyncTable::Categories, "user_id,local_id", row)
            .await
    }

    async fn upsert_preferences(&self, row: &PreferencesRow) -> RemoteResult<String> {
        row.validate()?;
        self.upsert(SyncTable::Preferences, "user_id", row).await
    }

    async fn soft_delete(
        &self,
        table: SyncTable,
        user_id: &str,
        local_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> RemoteResult<()> {
        if table == SyncTable::Preferences {
            return Err(RemoteError::Unsupported(
                "preferences cannot be deleted".to_string(),
            ));
        }

        let request = self.authorized(
            self.client
                .patch(self.table_url(table))
                .query(&[
                    ("user_id", format!("eq.{user_id}")),
                    ("local_id", format!("eq.{local_id}")),
                ])
                .header("Prefer", "return=minimal")
                .json(&serde_json::json!({ "deleted_at": deleted_at })),
        );
        Self::checked(request.send().await?).await?;
        Ok(())
    }

    async fn fetch_expenses(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<ExpenseRow>> {
        self.fetch(SyncTable::Expenses, user_id, since).await
    }

    async fn fetch_categories(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Vec<CategoryRow>> {
        self.fetch(SyncTable::Categories, user_id, since).await
    }

    async fn fetch_preferences(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> RemoteResult<Option<PreferencesRow>> {
        let request = self.authorized(
            self.client
                .get(self.table_url(SyncTable::Preferences))
                .query(&owner_filter(user_id, since))
                .header("Accept", SINGLE_OBJECT),
        );
        let response = match Self::checked(request.send().await?).await {
            Ok(response) => response,
            Err(RemoteError::NotFound) => return Ok(None),
            Err(error) => return Err(error),
        };
        Ok(Some(response.json::<PreferencesRow>().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryId, ExpenseId, Preferences};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, header, header_exists, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> SupabaseRemoteStore {
        let config = RemoteConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "anon".to_string(),
            ..RemoteConfig::default()
        };
        SupabaseRemoteStore::new(&config, "access").unwrap()
    }

    fn expense_row() -> ExpenseRow {
        ExpenseRow {
            id: None,
            user_id: "user-1".to_string(),
            local_id: ExpenseId::new().as_str(),
            amount: dec!(12.5),
            currency: "USD".to_string(),
            category: CategoryId::new().as_str(),
            description: "Lunch".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
            is_recurring: false,
            recurring_frequency: None,
            created_at: DateTime::from_timestamp_millis(1_767_225_600_000).unwrap(),
            updated_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_targets_tenant_key_and_returns_server_id() {
        let server = MockServer::start().await;
        let row = expense_row();
        Mock::given(method("POST"))
            .and(path("/rest/v1/expenses"))
            .and(query_param("on_conflict", "user_id,local_id"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer access"))
            .and(header_exists("prefer"))
            .and(body_partial_json(json!({
                "user_id": "user-1",
                "local_id": row.local_id,
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "srv-1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let server_id = store(&server).upsert_expense(&row).await.unwrap();
        assert_eq!(server_id, "srv-1");
    }

    #[tokio::test]
    async fn invalid_rows_never_reach_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut row = expense_row();
        row.currency = "dollars".to_string();
        let result = store(&server).upsert_expense(&row).await;
        assert!(matches!(result, Err(RemoteError::InvalidRow(_))));
    }

    #[tokio::test]
    async fn soft_delete_patches_tombstone() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/categories"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("local_id", "eq.cat-1"))
            .and(body_partial_json(json!({ "deleted_at": "2026-01-01T00:00:00Z" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let deleted_at = DateTime::from_timestamp_millis(1_767_225_600_000).unwrap();
        store(&server)
            .soft_delete(SyncTable::Categories, "user-1", "cat-1", deleted_at)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_filters_by_checkpoint() {
        let server = MockServer::start().await;
        let mut row = expense_row();
        row.id = Some("srv-1".to_string());
        row.updated_at = DateTime::from_timestamp_millis(1_767_225_601_000);

        Mock::given(method("GET"))
            .and(path("/rest/v1/expenses"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("updated_at", "gt.2026-01-01T00:00:00.000Z"))
            .and(query_param("order", "updated_at.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(&server)
            .await;

        let since = DateTime::from_timestamp_millis(1_767_225_600_000);
        let rows = store(&server)
            .fetch_expenses("user-1", since)
            .await
            .unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn missing_preferences_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_preferences"))
            .and(header("accept", SINGLE_OBJECT))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&server)
            .await;

        let preferences = store(&server)
            .fetch_preferences("user-1", None)
            .await
            .unwrap();
        assert!(preferences.is_none());
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/user_preferences"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "JWT expired" })),
            )
            .mount(&server)
            .await;

        let row = PreferencesRow::from_preferences("user-1", &Preferences::default());
        let error = store(&server).upsert_preferences(&row).await.unwrap_err();
        assert_eq!(error.to_string(), "Remote API error: JWT expired (401)");
    }

    #[tokio::test]
    async fn preferences_delete_is_unsupported() {
        let server = MockServer::start().await;
        let result = store(&server)
            .soft_delete(SyncTable::Preferences, "user-1", "preferences", Utc::now())
            .await;
        assert!(matches!(result, Err(RemoteError::Unsupported(_))));
    }
}
