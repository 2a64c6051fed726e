use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lapor_shared::errors::{AppError, AppResult};
use lapor_shared::types::api::{ApiResponse, Empty};
use lapor_shared::types::auth::TokenPair;

use crate::extract::AppJson;
use crate::guard::Actor;
use crate::models::User;
use crate::services::directory::{self, Credentials, Registration};
use crate::services::sessions;
use crate::AppState;

/// `{ user, access_token, token_type, expires_in, refresh_token }`
#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<Registration>,
) -> AppResult<(StatusCode, Json<ApiResponse<SessionBody>>)> {
    let (user, tokens) = directory::register(&state, req)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(SessionBody { user, tokens }))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<Credentials>,
) -> AppResult<Json<ApiResponse<SessionBody>>> {
    let (user, tokens) = directory::authenticate(&state, req)?;
    Ok(Json(ApiResponse::ok(SessionBody { user, tokens })))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    if req.refresh_token.is_empty() {
        return Err(AppError::invalid_field("refresh_token", "the refresh_token field is required"));
    }
    let pair = sessions::refresh(&state, &req.refresh_token)?;
    Ok(Json(ApiResponse::ok(pair)))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<Empty>>> {
    sessions::revoke_all(&state, actor.id)?;
    Ok(Json(ApiResponse::message("Logged out successfully")))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<UserBody>>> {
    let user = directory::profile(&state, &actor)?;
    Ok(Json(ApiResponse::ok(UserBody { user })))
}
