use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use samsaya::config::FirestoreConfig;
use samsaya::session::types::{Attachment, ChatMessage, Role, SessionState, StoredSession, UserProfile};
use samsaya::store::firestore::FirestoreStore;
use samsaya::store::{RemoteStore, StoreError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const API_KEY: &str = "web-api-key";
const ID_TOKEN: &str = "id-token-1";

#[derive(Clone, Default)]
struct MockFirestore {
    docs: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
    sign_ins: Arc<AtomicUsize>,
    anonymous_disabled: Arc<AtomicBool>,
    deny_writes: Arc<AtomicBool>,
}

type DocPath = Path<(String, String, String, String)>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {ID_TOKEN}").as_str())
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": status.as_u16(), "message": message } })),
    )
        .into_response()
}

async fn sign_up(State(mock): State<MockFirestore>, Query(query): Query<HashMap<String, String>>) -> Response {
    if mock.anonymous_disabled.load(Ordering::SeqCst) {
        return error(StatusCode::BAD_REQUEST, "ADMIN_ONLY_OPERATION");
    }
    if query.get("key").map(String::as_str) != Some(API_KEY) {
        return error(StatusCode::BAD_REQUEST, "API key not valid. Please pass a valid API key.");
    }
    mock.sign_ins.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "idToken": ID_TOKEN,
        "refreshToken": "refresh-1",
        "expiresIn": "3600",
        "localId": "anon-uid"
    }))
    .into_response()
}

async fn get_doc(
    State(mock): State<MockFirestore>,
    Path((_project, _db, collection, id)): DocPath,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    }
    let doc = mock.docs.lock().unwrap().get(&format!("{collection}/{id}")).cloned();
    match doc {
        Some(fields) => Json(json!({ "name": format!("{collection}/{id}"), "fields": fields })).into_response(),
        None => error(StatusCode::NOT_FOUND, "NOT_FOUND"),
    }
}

async fn patch_doc(
    State(mock): State<MockFirestore>,
    Path((_project, _db, collection, id)): DocPath,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED");
    }
    if mock.deny_writes.load(Ordering::SeqCst) {
        return error(StatusCode::FORBIDDEN, "Missing or insufficient permissions.");
    }
    let Some(fields) = body.get("fields").and_then(Value::as_object) else {
        return error(StatusCode::BAD_REQUEST, "fields required");
    };

    let mut docs = mock.docs.lock().unwrap();
    let doc = docs.entry(format!("{collection}/{id}")).or_default();
    for (_, path) in query.iter().filter(|(k, _)| k == "updateMask.fieldPaths") {
        match fields.get(path) {
            Some(value) => doc.insert(path.clone(), value.clone()),
            None => doc.remove(path),
        };
    }
    Json(json!({ "fields": doc.clone() })).into_response()
}

async fn spawn_mock() -> (String, MockFirestore) {
    let mock = MockFirestore::default();
    let app = Router::new()
        .route("/auth/accounts:signUp", post(sign_up))
        .route(
            "/v1/projects/{project}/databases/{db}/documents/{collection}/{id}",
            get(get_doc).patch(patch_doc),
        )
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

fn config(base: &str) -> FirestoreConfig {
    FirestoreConfig {
        enabled: true,
        api_key: API_KEY.into(),
        project_id: "sundarban-demo".into(),
        auth_url: format!("{base}/auth"),
        token_url: format!("{base}/token"),
        base_url: format!("{base}/v1"),
        ..Default::default()
    }
}

fn sample_session() -> StoredSession {
    let mut state = SessionState::default();
    state.agent_name = "Mangrove Desk".into();
    state.knowledge_base.key_terms.insert("বাঘ".into());
    state.messages = vec![
        ChatMessage::new(Role::User, "Identify this").with_attachments(vec![Attachment {
            mime_type: "image/png".into(),
            data: "iVBORw0KGgo=".into(),
            name: Some("crab.png".into()),
        }]),
        ChatMessage::new(Role::Model, "A fiddler crab."),
    ];
    state.to_stored(1_700_000_000_456)
}

#[tokio::test]
async fn signs_in_once_and_round_trips_a_session() {
    let (base, mock) = spawn_mock().await;
    let store = FirestoreStore::new(config(&base));

    assert!(store.initialize().await);
    assert!(store.initialize().await);
    assert_eq!(mock.sign_ins.load(Ordering::SeqCst), 1);

    assert!(store.load("sid-7").await.unwrap().is_none());

    let stored = sample_session();
    store.save("sid-7", &stored).await.unwrap();
    {
        let docs = mock.docs.lock().unwrap();
        let doc = &docs["sessions/sid-7"];
        assert_eq!(doc["lastUpdated"], json!({ "integerValue": "1700000000456" }));
        assert_eq!(doc["appName"], json!({ "stringValue": "Mangrove Desk" }));
    }

    let patch = store.load("sid-7").await.unwrap().unwrap();
    assert_eq!(patch.last_updated, Some(1_700_000_000_456));
    assert_eq!(patch.app_name.as_deref(), Some("Mangrove Desk"));
    let messages = patch.messages.unwrap();
    assert_eq!(messages, stored.messages);
    assert!(patch.syllabus_data.unwrap().key_terms.contains("বাঘ"));
}

#[tokio::test]
async fn disabled_anonymous_auth_leaves_store_uninitialized() {
    let (base, mock) = spawn_mock().await;
    mock.anonymous_disabled.store(true, Ordering::SeqCst);
    let store = FirestoreStore::new(config(&base));

    assert!(!store.initialize().await);
    assert!(!store.is_initialized());

    let err = store.load("sid-7").await.unwrap_err();
    assert!(matches!(err, StoreError::NotConfigured { .. }));
}

#[tokio::test]
async fn denied_write_is_a_permission_error() {
    let (base, mock) = spawn_mock().await;
    let store = FirestoreStore::new(config(&base));
    assert!(store.initialize().await);

    mock.deny_writes.store(true, Ordering::SeqCst);
    let err = store.save("sid-7", &sample_session()).await.unwrap_err();
    assert!(err.is_permission());
}

#[tokio::test]
async fn profile_document_is_keyed_by_sanitized_email() {
    let (base, mock) = spawn_mock().await;
    let store = FirestoreStore::new(config(&base));
    assert!(store.initialize().await);

    let profile = UserProfile {
        name: "Rina".into(),
        email: "rina.das@example.org".into(),
        mobile: "9000000000".into(),
        registered_at: 1_700_000_000_000,
    };
    assert!(store.save_profile(&profile).await);

    let docs = mock.docs.lock().unwrap();
    let doc = &docs["users/rina_das_example_org"];
    assert_eq!(doc["email"], json!({ "stringValue": "rina.das@example.org" }));
    assert_eq!(doc["registeredAt"], json!({ "integerValue": "1700000000000" }));
}
