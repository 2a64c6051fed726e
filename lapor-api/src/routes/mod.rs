pub mod auth;
pub mod health;
pub mod reports;
pub mod users;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::AppConfig;
use crate::AppState;

// Room for the text fields around the photo in a multipart body
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(config: &AppConfig) -> Router<Arc<AppState>> {
    let upload_limit = DefaultBodyLimit::max(config.max_photo_bytes + MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Sessions
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/profile", get(auth::profile))
        // Accounts
        .route(
            "/users/:id",
            get(users::show).put(users::update).delete(users::destroy),
        )
        .route("/users", get(users::list_citizens))
        .route("/relawan", get(users::list_volunteers))
        .route("/all-users", get(users::list_all))
        .route("/register-relawan", post(users::register_volunteer))
        .route("/register-admin", post(users::register_admin))
        // Reports
        .route(
            "/reports",
            get(reports::list).post(reports::create).layer(upload_limit.clone()),
        )
        .route(
            "/reports/:id",
            get(reports::show)
                .put(reports::update)
                .delete(reports::destroy)
                .layer(upload_limit),
        )
        .route("/problem-types", get(reports::problem_types))
}
