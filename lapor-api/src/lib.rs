pub mod blob;
pub mod config;
mod extract;
pub mod guard;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::middleware;
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lapor_shared::middleware::metrics_middleware;

pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn store::Store>,
    pub blobs: Arc<dyn blob::BlobStore>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Full HTTP surface with its middleware stack.
pub fn app(state: Arc<AppState>) -> Router {
    routes::router(&state.config)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(AllowMethods::list([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ]))
                .allow_headers(AllowHeaders::list([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                ])),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
