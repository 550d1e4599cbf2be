//! Remote store B: Supabase relational tables through PostgREST.
//!
//! Sessions are rows of `session_table` keyed by `id`; `lastUpdated` is a
//! timestamp column written as ISO-8601 and converted back to epoch ms on
//! load. Profiles are upserted into `user_table` on conflict with `email`.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{status_error, transport_error, RemoteStore, StoreError, StoreResult};
use crate::config::SupabaseConfig;
use crate::session::types::{SessionPatch, StoredSession, StoredTimestamp, UserProfile};

const STORE: &str = "supabase";

/// PostgREST code for "the result contains 0 rows" on a single-object read.
const NO_ROWS_CODE: &str = "PGRST116";

pub struct SupabaseStore {
    config: SupabaseConfig,
    client: reqwest::Client,
    ready: OnceCell<bool>,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            ready: OnceCell::new(),
        }
    }

    fn table_url(&self, table: &str) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.url).map_err(|e| {
            tracing::warn!(url = %self.config.url, error = %e, "invalid supabase url");
            StoreError::NotConfigured { store: STORE }
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::NotConfigured { store: STORE })?
            .pop_if_empty()
            .extend(["rest", "v1", table]);
        Ok(url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    async fn upsert(&self, table: &str, on_conflict: &str, row: Value) -> StoreResult<()> {
        if !self.is_initialized() {
            return Err(StoreError::NotConfigured { store: STORE });
        }
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);

        let resp = self
            .authed(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(STORE, status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn initialize(&self) -> bool {
        *self
            .ready
            .get_or_init(|| async {
                if !self.config.is_configured() {
                    tracing::debug!("supabase url or anon key missing");
                    return false;
                }
                match self.table_url(&self.config.session_table) {
                    Ok(_) => {
                        tracing::info!("supabase initialized");
                        true
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "supabase init failed");
                        false
                    }
                }
            })
            .await
    }

    fn is_initialized(&self) -> bool {
        self.ready.get().copied().unwrap_or(false)
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<SessionPatch>> {
        if !self.is_initialized() {
            return Err(StoreError::NotConfigured { store: STORE });
        }
        let mut url = self.table_url(&self.config.session_table)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{session_id}"))
            .append_pair("select", "*");

        let resp = self
            .authed(self.client.get(url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::NOT_ACCEPTABLE && body.contains(NO_ROWS_CODE) {
                return Ok(None);
            }
            return Err(status_error(STORE, status, body));
        }

        let row: Map<String, Value> = resp.json().await.map_err(|e| StoreError::Parse {
            store: STORE,
            message: e.to_string(),
        })?;
        row_to_patch(row).map(Some)
    }

    async fn save(&self, session_id: &str, state: &StoredSession) -> StoreResult<()> {
        let row = session_row(session_id, state)?;
        self.upsert(&self.config.session_table, "id", row).await
    }

    async fn save_profile(&self, profile: &UserProfile) -> bool {
        let row = serde_json::json!({
            "email": profile.email,
            "name": profile.name,
            "mobile": profile.mobile,
            "registeredAt": millis_to_iso(profile.registered_at),
        });
        match self.upsert(&self.config.user_table, "email", row).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "supabase save user error");
                false
            }
        }
    }
}

/// Build the table row: the stored session plus `id`, with an ISO `lastUpdated`.
pub fn session_row(session_id: &str, state: &StoredSession) -> StoreResult<Value> {
    let Value::Object(mut row) = serde_json::to_value(state)? else {
        return Err(StoreError::Parse {
            store: STORE,
            message: "session record is not an object".into(),
        });
    };
    row.insert("id".into(), Value::String(session_id.to_string()));
    row.insert(
        "lastUpdated".into(),
        Value::String(millis_to_iso(state.last_updated)),
    );
    Ok(Value::Object(row))
}

/// Parse a table row back into a partial record.
///
/// `lastUpdated` is informational: a value that cannot be read as a
/// timestamp is logged and dropped, the rest of the row still applies.
pub fn row_to_patch(mut row: Map<String, Value>) -> StoreResult<SessionPatch> {
    row.remove("id");
    if let Some(raw) = row.remove("lastUpdated") {
        let ms = last_updated_millis(raw);
        row.insert("lastUpdated".into(), ms.map_or(Value::Null, Value::from));
    }
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Parse {
        store: STORE,
        message: e.to_string(),
    })
}

fn last_updated_millis(raw: Value) -> Option<i64> {
    let parsed = serde_json::from_value::<Option<StoredTimestamp>>(raw.clone())
        .map_err(|e| e.to_string())
        .and_then(|ts| ts.map(|ts| ts.to_datetime()).transpose());
    match parsed {
        Ok(dt) => dt.map(|dt| dt.timestamp_millis()),
        Err(e) => {
            tracing::warn!(store = STORE, value = %raw, error = %e, "ignoring unreadable lastUpdated");
            None
        }
    }
}

fn millis_to_iso(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
