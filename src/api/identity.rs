use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, AppState};
use crate::identity::Identity;
use crate::llm::{set_user_api_key, KeyUpdate};
use crate::session::types::UserProfile;

#[derive(Debug, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
}

pub async fn current(State(state): State<AppState>) -> ApiResult<Identity> {
    Ok(Json(state.identity.current()?))
}

pub async fn register(State(state): State<AppState>, Json(body): Json<Registration>) -> ApiResult<UserProfile> {
    let profile = state
        .identity
        .register(&body.name, &body.email, &body.mobile)
        .await?;
    Ok(Json(profile))
}

pub async fn start_guest(State(state): State<AppState>) -> ApiResult<Identity> {
    Ok(Json(state.identity.start_guest()?))
}

pub async fn logout(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.identity.logout()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyBody {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResult {
    pub status: KeyUpdate,
}

pub async fn set_api_key(State(state): State<AppState>, Json(body): Json<ApiKeyBody>) -> ApiResult<ApiKeyResult> {
    let status = set_user_api_key(&state.local, &body.key)?;
    Ok(Json(ApiKeyResult { status }))
}
