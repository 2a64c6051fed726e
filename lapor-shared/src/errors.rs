use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::ApiErrorResponse;

/// Coarse failure classes every operation reports in.
///
/// HTTP status is derived from the kind, never from the individual code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Invalid,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Expired,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthenticated | Self::Expired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth and session errors
/// - E2xxx: User directory errors
/// - E3xxx: Report registry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    PayloadTooLarge,

    // Auth (E1xxx)
    InvalidCredentials,
    EmailAlreadyExists,
    TokenExpired,
    TokenInvalid,
    RefreshTokenExpired,
    RefreshTokenInvalid,
    PasswordTooWeak,

    // Users (E2xxx)
    UserNotFound,
    NationalIdAlreadyExists,
    AdminRequired,

    // Reports (E3xxx)
    ReportNotFound,
    ReportNotEditable,
    UnsupportedPhoto,
    PhotoMissing,
    PhotoUploadFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0006",
            Self::PayloadTooLarge => "E0007",

            // Auth
            Self::InvalidCredentials => "E1001",
            Self::EmailAlreadyExists => "E1002",
            Self::TokenExpired => "E1003",
            Self::TokenInvalid => "E1004",
            Self::RefreshTokenExpired => "E1005",
            Self::RefreshTokenInvalid => "E1006",
            Self::PasswordTooWeak => "E1007",

            // Users
            Self::UserNotFound => "E2001",
            Self::NationalIdAlreadyExists => "E2002",
            Self::AdminRequired => "E2003",

            // Reports
            Self::ReportNotFound => "E3001",
            Self::ReportNotEditable => "E3002",
            Self::UnsupportedPhoto => "E3003",
            Self::PhotoMissing => "E3004",
            Self::PhotoUploadFailed => "E3005",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InternalError | Self::PhotoUploadFailed => ErrorKind::Internal,
            Self::ValidationError | Self::BadRequest | Self::PayloadTooLarge
            | Self::PasswordTooWeak | Self::UnsupportedPhoto | Self::PhotoMissing => ErrorKind::Invalid,
            Self::NotFound | Self::UserNotFound | Self::ReportNotFound => ErrorKind::NotFound,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenInvalid
            | Self::RefreshTokenInvalid => ErrorKind::Unauthenticated,
            Self::TokenExpired | Self::RefreshTokenExpired => ErrorKind::Expired,
            Self::Forbidden | Self::AdminRequired | Self::ReportNotEditable => ErrorKind::Forbidden,
            Self::EmailAlreadyExists | Self::NationalIdAlreadyExists => ErrorKind::Conflict,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => self.kind().status_code(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Validation failure on a single field, reported as `{ field: [message] }`.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = Map::new();
        fields.insert(field.to_string(), json!([message.clone()]));
        Self::with_details(ErrorCode::ValidationError, message, Value::Object(fields))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Known { code, .. } => code.kind(),
            AppError::Database(diesel::result::Error::NotFound) => ErrorKind::NotFound,
            AppError::Internal(_) | AppError::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = Map::new();
        for (field, errs) in errors.field_errors() {
            let messages: Vec<Value> = errs
                .iter()
                .map(|e| {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid ({})", e.code));
                    Value::String(msg)
                })
                .collect();
            fields.insert(field.to_string(), Value::Array(messages));
        }
        Self::with_details(ErrorCode::ValidationError, "the given data was invalid", Value::Object(fields))
    }
}

// Extractor rejections answer in the same envelope as every other error.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ErrorCode::ValidationError.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorCode::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::RefreshTokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ReportNotEditable.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ReportNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EmailAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::PayloadTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn expired_is_its_own_kind() {
        let err = AppError::new(ErrorCode::RefreshTokenExpired, "refresh token expired");
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert_eq!(err.code(), Some(ErrorCode::RefreshTokenExpired));
    }

    #[tokio::test]
    async fn known_error_body() {
        let value = body_json(AppError::new(ErrorCode::InvalidCredentials, "Bad Credentials")).await;
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "Bad Credentials");
        assert_eq!(value["error"]["code"], "E1001");
    }

    #[tokio::test]
    async fn field_errors_are_structured() {
        let value = body_json(AppError::invalid_field("description", "description may not exceed 1000 characters")).await;
        assert_eq!(value["error"]["code"], "E0002");
        assert_eq!(
            value["error"]["details"]["description"][0],
            "description may not exceed 1000 characters"
        );
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        let value = body_json(err).await;
        assert_eq!(value["message"], "internal server error");
        assert!(!value.to_string().contains("10.0.0.3"));
    }
}
