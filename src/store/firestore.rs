//! Remote store A: Firestore document database over its REST API.
//!
//! Initialization signs in anonymously through Identity Toolkit with the web
//! API key; every later request carries the resulting ID token, refreshed
//! through the secure-token endpoint when it nears expiry. Sessions live at
//! `{sessions_collection}/{session id}`, profiles at
//! `{users_collection}/{sanitized email}`. Saves are `PATCH` requests with an
//! `updateMask` over the written fields, which gives merge semantics.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use super::{status_error, transport_error, RemoteStore, StoreError, StoreResult};
use crate::config::FirestoreConfig;
use crate::session::types::{SessionPatch, StoredSession, UserProfile};

const STORE: &str = "firestore";

#[derive(Debug, Clone)]
struct IdToken {
    token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl IdToken {
    fn is_stale(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(60) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

pub struct FirestoreStore {
    config: FirestoreConfig,
    client: reqwest::Client,
    ready: OnceCell<bool>,
    token: Mutex<Option<IdToken>>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            ready: OnceCell::new(),
            token: Mutex::new(None),
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            tracing::warn!(base_url = %self.config.base_url, error = %e, "invalid firestore base url");
            StoreError::NotConfigured { store: STORE }
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::NotConfigured { store: STORE })?
            .pop_if_empty()
            .extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                collection,
                id,
            ]);
        Ok(url)
    }

    async fn sign_in(&self) -> StoreResult<IdToken> {
        let mut url = Url::parse(&format!("{}/accounts:signUp", self.config.auth_url))
            .map_err(|_| StoreError::NotConfigured { store: STORE })?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        let resp = self
            .client
            .post(url)
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // anonymous sign-in disabled or key restricted
            if body.contains("ADMIN_ONLY_OPERATION")
                || body.contains("OPERATION_NOT_ALLOWED")
                || status == StatusCode::FORBIDDEN
            {
                return Err(StoreError::Permission {
                    store: STORE,
                    message: "anonymous sign-in is disabled for this project or the API key is restricted".into(),
                });
            }
            return Err(status_error(STORE, status, body));
        }

        let body: SignUpResponse = resp.json().await.map_err(|e| StoreError::Parse {
            store: STORE,
            message: e.to_string(),
        })?;
        Ok(IdToken {
            token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(body.expires_in.as_deref()),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> StoreResult<IdToken> {
        let mut url = Url::parse(&self.config.token_url)
            .map_err(|_| StoreError::NotConfigured { store: STORE })?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        let resp = self
            .client
            .post(url)
            .json(&json!({ "grant_type": "refresh_token", "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(STORE, status, body));
        }

        let body: RefreshResponse = resp.json().await.map_err(|e| StoreError::Parse {
            store: STORE,
            message: e.to_string(),
        })?;
        Ok(IdToken {
            token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(body.expires_in.as_deref()),
        })
    }

    /// Current ID token, refreshed if close to expiry.
    async fn id_token(&self) -> StoreResult<String> {
        if !self.is_initialized() {
            return Err(StoreError::NotConfigured { store: STORE });
        }
        let mut guard = self.token.lock().await;
        let current = guard.clone().ok_or(StoreError::NotConfigured { store: STORE })?;
        if !current.is_stale() {
            return Ok(current.token);
        }

        tracing::debug!("refreshing firestore id token");
        let fresh = match self.refresh(&current.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, signing in again");
                self.sign_in().await?
            }
        };
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn patch_document(&self, collection: &str, id: &str, fields: Map<String, Value>) -> StoreResult<()> {
        let token = self.id_token().await?;
        let mut url = self.document_url(collection, id)?;
        {
            let mut query = url.query_pairs_mut();
            for key in fields.keys() {
                query.append_pair("updateMask.fieldPaths", key);
            }
        }

        let resp = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(&json!({ "fields": encode_fields(&fields) }))
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
impl RemoteStore for FirestoreStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn initialize(&self) -> bool {
        *self
            .ready
            .get_or_init(|| async {
                match self.sign_in().await {
                    Ok(token) => {
                        *self.token.lock().await = Some(token);
                        tracing::info!(project = %self.config.project_id, "firestore initialized and authenticated anonymously");
                        true
                    }
                    Err(e) if e.is_permission() => {
                        tracing::warn!(error = %e, "firestore cloud sync disabled");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "firestore initialization failed");
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
        let token = self.id_token().await?;
        let url = self.document_url(&self.config.sessions_collection, session_id)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(STORE, status, body));
        }

        let doc: Document = resp.json().await.map_err(|e| StoreError::Parse {
            store: STORE,
            message: e.to_string(),
        })?;
        let plain = decode_fields(&doc.fields).map_err(|message| StoreError::Parse { store: STORE, message })?;
        let patch = serde_json::from_value(Value::Object(plain)).map_err(|e| StoreError::Parse {
            store: STORE,
            message: e.to_string(),
        })?;
        Ok(Some(patch))
    }

    async fn save(&self, session_id: &str, state: &StoredSession) -> StoreResult<()> {
        let Value::Object(fields) = serde_json::to_value(state)? else {
            return Err(StoreError::Parse {
                store: STORE,
                message: "session record is not an object".into(),
            });
        };
        let collection = self.config.sessions_collection.clone();
        self.patch_document(&collection, session_id, fields).await
    }

    async fn save_profile(&self, profile: &UserProfile) -> bool {
        let fields = match serde_json::to_value(profile) {
            Ok(Value::Object(map)) => map,
            _ => return false,
        };
        let collection = self.config.users_collection.clone();
        match self.patch_document(&collection, &profile.storage_key(), fields).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "failed to save user profile to firestore");
                false
            }
        }
    }
}

fn expiry(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    Utc::now() + ChronoDuration::seconds(secs)
}

/// Encode plain JSON into Firestore's typed value representation.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // integers travel as decimal strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()
}

/// Decode a Firestore typed value back into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected a typed value, got {value}"))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| "empty typed value".to_string())?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(inner.clone()),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().map_err(|e| format!("bad integerValue {s:?}: {e}"))?,
                Value::Number(n) => n.as_i64().ok_or_else(|| format!("bad integerValue {n}"))?,
                other => return Err(format!("bad integerValue {other}")),
            };
            Ok(Value::from(parsed))
        }
        "doubleValue" => match inner {
            Value::Number(_) => Ok(inner.clone()),
            // NaN and infinities arrive as strings
            Value::String(_) => Ok(Value::Null),
            other => Err(format!("bad doubleValue {other}")),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Object(fields))
        }
        other => Err(format!("unsupported firestore value type: {other}")),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|plain| (k.clone(), plain)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_encode_as_strings() {
        assert_eq!(
            encode_value(&json!(1_700_000_000_123_i64)),
            json!({ "integerValue": "1700000000123" })
        );
        assert_eq!(encode_value(&json!(0.5)), json!({ "doubleValue": 0.5 }));
    }

    #[test]
    fn nested_document_survives_encoding() {
        let plain = json!({
            "appName": "Tide Desk",
            "messages": [{ "id": "a", "timestamp": 42, "attachments": [] }],
            "syllabusData": { "key_terms": ["বাঘ", "tide"], "suggested_queries": null },
            "flag": true
        });
        let encoded = encode_value(&plain);
        assert_eq!(decode_value(&encoded).unwrap(), plain);
    }

    #[test]
    fn missing_array_values_decode_to_empty() {
        assert_eq!(decode_value(&json!({ "arrayValue": {} })).unwrap(), json!([]));
        assert_eq!(decode_value(&json!({ "mapValue": {} })).unwrap(), json!({}));
    }

    #[test]
    fn unknown_value_type_is_rejected() {
        assert!(decode_value(&json!({ "vectorValue": {} })).is_err());
    }

    #[test]
    fn document_url_escapes_ids() {
        let store = FirestoreStore::new(FirestoreConfig {
            project_id: "demo".into(),
            base_url: "http://localhost:8080/v1".into(),
            ..Default::default()
        });
        let url = store.document_url("users", "+91 7000").unwrap();
        assert!(url.as_str().starts_with("http://localhost:8080/v1/projects/demo/databases/"));
        assert!(url.as_str().ends_with("/documents/users/+91%207000"));
    }
}
