use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use lapor_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

fn check(name: &str, result: anyhow::Result<()>) -> HealthCheck {
    match result {
        Ok(()) => HealthCheck {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => {
            tracing::warn!(check = name, error = %e, "health check failed");
            HealthCheck {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(format!("{name} unavailable")),
            }
        }
    }
}

/// Probes the database and the photo bucket.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = vec![
        check("database", state.store.ping()),
        check("storage", state.blobs.ping().await),
    ];

    let response = HealthResponse::healthy("lapor-api", env!("CARGO_PKG_VERSION")).with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
