//! HTTP API over the session coordinator.
//!
//! Session, message, and knowledge routes sit behind the identity gate and
//! answer 403 until a user has registered or opened a guest window.

pub mod identity;
pub mod knowledge;
pub mod messages;
pub mod persona;
pub mod session;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::SamsayaConfig;
use crate::identity::{IdentityError, IdentityGate};
use crate::llm::{resolve_api_key, ChatModel, LlmError};
use crate::store::local::LocalStore;
use crate::store::StoreError;
use crate::sync::coordinator::RemoteStatus;
use crate::sync::SessionCoordinator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SamsayaConfig>,
    pub local: Arc<LocalStore>,
    pub coordinator: SessionCoordinator,
    pub identity: Arc<IdentityGate>,
    pub model: Arc<dyn ChatModel>,
}

/// JSON error body with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        let status = match &e {
            IdentityError::MissingFields(_) => StatusCode::BAD_REQUEST,
            IdentityError::GuestWindowUsed => StatusCode::FORBIDDEN,
            IdentityError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        let status = match &e {
            LlmError::InvalidKey => StatusCode::BAD_REQUEST,
            LlmError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            LlmError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, e.to_string())
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/api/session", get(session::get_session).patch(session::patch_session))
        .route("/api/messages", post(messages::send))
        .route("/api/messages/clear", post(messages::clear))
        .route("/api/chat/new", post(messages::new_chat))
        .route("/api/messages/{id}/translation", post(messages::translate))
        .route("/api/knowledge/sources", post(knowledge::add_source))
        .route("/api/knowledge/sources/{index}", delete(knowledge::remove_source))
        .route("/api/knowledge/generate", post(persona::populate_knowledge))
        .route("/api/persona/variations", post(persona::variations))
        .route("/api/persona/draft", post(persona::draft))
        .route("/api/configure", post(persona::auto_configure))
        .route("/api/export", get(session::export))
        .route("/api/import", post(session::import))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity));

    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/identity",
            get(identity::current).delete(identity::logout),
        )
        .route("/api/identity/register", post(identity::register))
        .route("/api/identity/guest", post(identity::start_guest))
        .route("/api/llm/key", put(identity::set_api_key))
        .merge(gated)
        .with_state(state)
}

async fn require_identity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.identity.has_identity() {
        next.run(request).await
    } else {
        ApiError::new(StatusCode::FORBIDDEN, "register or continue as guest first").into_response()
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    session_id: String,
    remotes: Vec<RemoteStatus>,
    llm_configured: bool,
    flush_pending: bool,
    guest_minutes_remaining: i64,
}

async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    Ok(Json(Health {
        status: "ok",
        session_id: state.coordinator.session_id().to_string(),
        remotes: state.coordinator.remote_status(),
        llm_configured: resolve_api_key(&state.local, &state.config.llm.api_key).is_ok(),
        flush_pending: state.coordinator.flush_pending(),
        guest_minutes_remaining: state.identity.guest_minutes_remaining()?,
    }))
}
