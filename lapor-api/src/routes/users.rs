use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use lapor_shared::errors::AppResult;
use lapor_shared::types::api::{ApiResponse, Empty};
use lapor_shared::types::auth::Role;

use crate::extract::{AppJson, AppPath};
use crate::guard::Actor;
use crate::models::User;
use crate::routes::auth::UserBody;
use crate::services::directory::{self, PrivilegedRegistration, ProfileChanges};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserList {
    pub count: usize,
    pub users: Vec<User>,
}

impl From<Vec<User>> for UserList {
    fn from(users: Vec<User>) -> Self {
        Self {
            count: users.len(),
            users,
        }
    }
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<UserBody>>> {
    let user = directory::show(&state, &actor, id)?;
    Ok(Json(ApiResponse::ok(UserBody { user })))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    AppJson(changes): AppJson<ProfileChanges>,
) -> AppResult<Json<ApiResponse<UserBody>>> {
    let user = directory::update_profile(&state, &actor, id, changes)?;
    Ok(Json(ApiResponse::ok_with_message(UserBody { user }, "User updated successfully")))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    directory::delete_user(&state, &actor, id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}

pub async fn list_citizens(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let users = directory::list_by_role(&state, &actor, Role::Citizen)?;
    Ok(Json(ApiResponse::ok(users.into())))
}

pub async fn list_volunteers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let users = directory::list_by_role(&state, &actor, Role::Volunteer)?;
    Ok(Json(ApiResponse::ok(users.into())))
}

pub async fn list_all(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let users = directory::list_all(&state, &actor)?;
    Ok(Json(ApiResponse::ok(users.into())))
}

fn register_with_role(
    state: &AppState,
    actor: &Actor,
    req: PrivilegedRegistration,
    role: Role,
    message: &str,
) -> AppResult<(StatusCode, Json<ApiResponse<UserBody>>)> {
    let user = directory::register_privileged(state, actor, req, role)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(UserBody { user }, message)),
    ))
}

pub async fn register_volunteer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppJson(req): AppJson<PrivilegedRegistration>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserBody>>)> {
    register_with_role(&state, &actor, req, Role::Volunteer, "Relawan registered successfully")
}

pub async fn register_admin(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppJson(req): AppJson<PrivilegedRegistration>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserBody>>)> {
    register_with_role(&state, &actor, req, Role::Admin, "Admin registered successfully")
}
