use axum::http::{header, HeaderMap};

use crate::errors::{AppError, ErrorCode};

/// Pulls the raw token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "Unauthenticated."))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme"))?
        .trim();

    if token.is_empty() {
        return Err(AppError::new(ErrorCode::Unauthorized, "Unauthenticated."));
    }

    Ok(token.to_string())
}
