//! Token lifecycle.
//!
//! A user holds at most one session: one live bearer token id and one
//! refresh token. Issuing a pair replaces whatever the user held before,
//! so logging in again signs out every other client.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use lapor_shared::errors::{AppError, AppResult, ErrorCode};
use lapor_shared::types::auth::{Claims, TokenPair};

use crate::guard::Actor;
use crate::models::{NewSession, User};
use crate::AppState;

const REFRESH_TOKEN_LEN: usize = 80;

pub fn generate_refresh_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn issue_session(state: &AppState, user: &User) -> AppResult<TokenPair> {
    let access_ttl = state.config.access_token_ttl_secs;
    let claims = Claims::new(user.id, user.role, access_ttl);
    let access_token = claims.encode(&state.config.jwt_secret)?;
    let refresh_token = generate_refresh_token();

    let now = Utc::now();
    state.store.start_session(NewSession {
        user_id: user.id,
        access_token_id: claims.jti,
        access_expires_at: now + Duration::seconds(access_ttl),
        refresh_token_hash: hash_token(&refresh_token),
        refresh_expires_at: now + Duration::seconds(state.config.refresh_token_ttl_secs),
    })?;

    Ok(TokenPair::new(access_token, refresh_token, access_ttl))
}

/// Trades a refresh token for a new pair. The presented token is consumed
/// either way: rotated on success, deleted when found expired.
pub fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenPair> {
    let stored = state
        .store
        .find_refresh_token(&hash_token(refresh_token))?
        .ok_or_else(|| AppError::new(ErrorCode::RefreshTokenInvalid, "Invalid refresh token"))?;

    if stored.is_expired() {
        state.store.delete_refresh_token(stored.id)?;
        return Err(AppError::new(ErrorCode::RefreshTokenExpired, "Refresh token expired"));
    }

    let user = state
        .store
        .find_user(stored.user_id)?
        .ok_or_else(|| AppError::new(ErrorCode::RefreshTokenInvalid, "Invalid refresh token"))?;

    let pair = issue_session(state, &user)?;
    tracing::info!(user_id = %user.id, "session refreshed");
    Ok(pair)
}

pub fn revoke_all(state: &AppState, user_id: Uuid) -> AppResult<()> {
    state.store.revoke_sessions(user_id)?;
    tracing::info!(user_id = %user_id, "sessions revoked");
    Ok(())
}

/// Resolves a bearer token to the calling actor. The role comes from the
/// stored user, not from the token, so role changes apply immediately.
pub fn authenticate_bearer(state: &AppState, token: &str) -> AppResult<Actor> {
    let claims = Claims::decode(token, &state.config.jwt_secret)?;

    let live = state
        .store
        .find_access_token(claims.jti)?
        .filter(|t| t.user_id == claims.sub && t.expires_at > Utc::now());
    if live.is_none() {
        return Err(AppError::new(ErrorCode::TokenInvalid, "Unauthenticated."));
    }

    let user = state
        .store
        .find_user(claims.sub)?
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "Unauthenticated."))?;

    Ok(Actor::from(&user))
}
