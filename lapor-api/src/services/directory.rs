//! User accounts: registration, credentials, profile edits and the
//! admin-only management operations.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use lapor_shared::errors::{AppError, AppResult, ErrorCode};
use lapor_shared::types::auth::{Role, TokenPair};

use crate::blob;
use crate::guard::{self, Actor};
use crate::models::{NewUser, ReportFilter, User};
use crate::services::{passwords, sessions, FieldErrors};
use crate::store::UniqueViolation;
use crate::AppState;

const NATIONAL_ID_LEN: usize = 16;
const PHONE_MAX_LEN: usize = 15;
const STUDENT_ID_MAX_LEN: usize = 20;
const MAJOR_MAX_LEN: usize = 100;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct Registration {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "the name field is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "the email must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Admin-initiated registration. Volunteers must carry a national id and a
/// phone number; both are ignored for admins.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PrivilegedRegistration {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "the name field is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "the email must be a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "nik")]
    pub national_id: Option<String>,
    #[serde(rename = "no_telp")]
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct Credentials {
    #[serde(default)]
    #[validate(length(min = 1, message = "the email field is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "the password field is required"))]
    pub password: String,
}

/// Partial profile update. Absent fields stay untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileChanges {
    #[validate(length(min = 1, max = 255, message = "the name may not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "the email must be a valid email address"))]
    pub email: Option<String>,
    pub password: Option<String>,
    /// Applied only when the caller is an admin.
    pub role: Option<String>,
    #[serde(rename = "nik")]
    pub national_id: Option<String>,
    #[serde(rename = "no_telp")]
    pub phone: Option<String>,
    #[serde(rename = "nim")]
    pub student_id: Option<String>,
    #[serde(rename = "jurusan")]
    pub major: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_not_found() -> AppError {
    AppError::new(ErrorCode::UserNotFound, "User not found")
}

fn email_taken() -> AppError {
    AppError::with_details(
        ErrorCode::EmailAlreadyExists,
        "the email has already been taken",
        serde_json::json!({ "email": ["the email has already been taken"] }),
    )
}

fn national_id_taken() -> AppError {
    AppError::with_details(
        ErrorCode::NationalIdAlreadyExists,
        "the nik has already been taken",
        serde_json::json!({ "nik": ["the nik has already been taken"] }),
    )
}

/// A concurrent writer can still win the race after the pre-checks; the
/// store's unique violation maps to the same conflict.
fn user_write_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<UniqueViolation>() {
        Some(UniqueViolation::Email) => email_taken(),
        Some(UniqueViolation::NationalId) => national_id_taken(),
        None => err.into(),
    }
}

fn ensure_email_free(state: &AppState, email: &str, except: Option<Uuid>) -> AppResult<()> {
    if state.store.email_taken(email, except)? {
        return Err(email_taken());
    }
    Ok(())
}

fn ensure_national_id_free(state: &AppState, national_id: &str, except: Option<Uuid>) -> AppResult<()> {
    if state.store.national_id_taken(national_id, except)? {
        return Err(national_id_taken());
    }
    Ok(())
}

fn check_national_id(errors: &mut FieldErrors, national_id: &str) {
    if national_id.chars().count() != NATIONAL_ID_LEN {
        errors.add("nik", format!("the nik must be {NATIONAL_ID_LEN} characters"));
    }
}

fn check_phone(errors: &mut FieldErrors, phone: &str) {
    if phone.is_empty() {
        errors.add("no_telp", "the no_telp may not be empty");
    } else if phone.chars().count() > PHONE_MAX_LEN {
        errors.add("no_telp", format!("the no_telp may not be greater than {PHONE_MAX_LEN} characters"));
    }
}

/// Self-service sign-up. Always creates a citizen and starts a session.
pub fn register(state: &AppState, input: Registration) -> AppResult<(User, TokenPair)> {
    input.validate()?;
    passwords::validate_password(&input.password)?;

    let email = normalize_email(&input.email);
    ensure_email_free(state, &email, None)?;

    let user = state.store.insert_user(NewUser {
        name: input.name.trim().to_string(),
        email,
        password_hash: passwords::hash_password(&input.password)?,
        role: Role::Citizen,
        national_id: None,
        phone: None,
    })
    .map_err(user_write_error)?;
    let pair = sessions::issue_session(state, &user)?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((user, pair))
}

pub fn register_privileged(
    state: &AppState,
    actor: &Actor,
    input: PrivilegedRegistration,
    role: Role,
) -> AppResult<User> {
    if !guard::can_manage_users(actor) {
        return Err(AppError::new(ErrorCode::AdminRequired, "Unauthorized"));
    }
    if role == Role::Citizen {
        return Err(AppError::invalid_field("role", "privileged registration is for volunteers and admins"));
    }

    input.validate()?;
    passwords::validate_password(&input.password)?;

    let (national_id, phone) = match role {
        Role::Volunteer => {
            let mut errors = FieldErrors::default();
            match input.national_id.as_deref() {
                Some(nik) => check_national_id(&mut errors, nik),
                None => errors.add("nik", "the nik field is required"),
            }
            match input.phone.as_deref() {
                Some(phone) => check_phone(&mut errors, phone),
                None => errors.add("no_telp", "the no_telp field is required"),
            }
            errors.into_result()?;
            (input.national_id, input.phone)
        }
        Role::Admin | Role::Citizen => (None, None),
    };

    let email = normalize_email(&input.email);
    ensure_email_free(state, &email, None)?;
    if let Some(nik) = national_id.as_deref() {
        ensure_national_id_free(state, nik, None)?;
    }

    let user = state.store.insert_user(NewUser {
        name: input.name.trim().to_string(),
        email,
        password_hash: passwords::hash_password(&input.password)?,
        role,
        national_id,
        phone,
    })
    .map_err(user_write_error)?;

    tracing::info!(actor_id = %actor.id, user_id = %user.id, role = %role, "privileged user registered");
    Ok(user)
}

/// Checks credentials and starts a new session, ending any previous one.
pub fn authenticate(state: &AppState, input: Credentials) -> AppResult<(User, TokenPair)> {
    input.validate()?;

    let bad_credentials = || AppError::new(ErrorCode::InvalidCredentials, "Bad Credentials");

    let user = state
        .store
        .find_user_by_email(&normalize_email(&input.email))?
        .ok_or_else(bad_credentials)?;
    if !passwords::verify_password(&input.password, &user.password_hash)? {
        return Err(bad_credentials());
    }

    let pair = sessions::issue_session(state, &user)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok((user, pair))
}

pub fn update_profile(
    state: &AppState,
    actor: &Actor,
    target_id: Uuid,
    changes: ProfileChanges,
) -> AppResult<User> {
    let target = state.store.find_user(target_id)?.ok_or_else(user_not_found)?;
    if !guard::can_view_user(actor, target_id) {
        return Err(AppError::forbidden("Unauthorized"));
    }

    changes.validate()?;

    let mut errors = FieldErrors::default();
    // Volunteer fields follow the role the user holds before this update.
    let volunteer_fields = target.role == Role::Volunteer;
    if volunteer_fields {
        if let Some(nik) = changes.national_id.as_deref() {
            check_national_id(&mut errors, nik);
        }
        if let Some(phone) = changes.phone.as_deref() {
            check_phone(&mut errors, phone);
        }
    }
    if let Some(nim) = changes.student_id.as_deref() {
        if nim.chars().count() > STUDENT_ID_MAX_LEN {
            errors.add("nim", format!("the nim may not be greater than {STUDENT_ID_MAX_LEN} characters"));
        }
    }
    if let Some(major) = changes.major.as_deref() {
        if major.chars().count() > MAJOR_MAX_LEN {
            errors.add("jurusan", format!("the jurusan may not be greater than {MAJOR_MAX_LEN} characters"));
        }
    }
    let new_role = match changes.role.as_deref() {
        Some(role) if guard::is_admin(actor) => match role.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.add("role", "the selected role is invalid");
                None
            }
        },
        _ => None,
    };
    errors.into_result()?;
    if let Some(password) = changes.password.as_deref() {
        passwords::validate_password(password)?;
    }

    let mut user = target;
    if let Some(name) = changes.name {
        user.name = name.trim().to_string();
    }
    if let Some(email) = changes.email {
        let email = normalize_email(&email);
        ensure_email_free(state, &email, Some(user.id))?;
        user.email = email;
    }
    if volunteer_fields {
        if let Some(nik) = changes.national_id {
            ensure_national_id_free(state, &nik, Some(user.id))?;
            user.national_id = Some(nik);
        }
        if let Some(phone) = changes.phone {
            user.phone = Some(phone);
        }
    }
    if let Some(nim) = changes.student_id {
        user.student_id = Some(nim);
    }
    if let Some(major) = changes.major {
        user.major = Some(major);
    }
    if let Some(role) = new_role {
        user.role = role;
    }
    if let Some(password) = changes.password {
        user.password_hash = passwords::hash_password(&password)?;
    }

    let user = state.store.update_user(&user).map_err(user_write_error)?;
    tracing::info!(actor_id = %actor.id, user_id = %user.id, "user updated");
    Ok(user)
}

/// Removes the user with their reports and sessions. Photos of the removed
/// reports are released afterwards on a best-effort basis.
pub async fn delete_user(state: &AppState, actor: &Actor, target_id: Uuid) -> AppResult<()> {
    if !guard::can_manage_users(actor) {
        return Err(AppError::new(ErrorCode::AdminRequired, "Unauthorized"));
    }

    let photos: Vec<String> = state
        .store
        .list_reports(&ReportFilter {
            owner: Some(target_id),
            ..ReportFilter::default()
        })?
        .into_iter()
        .map(|r| r.photo_path)
        .collect();

    if !state.store.delete_user(target_id)? {
        return Err(user_not_found());
    }

    for path in &photos {
        blob::release(state.blobs.as_ref(), path).await;
    }

    tracing::info!(actor_id = %actor.id, user_id = %target_id, reports = photos.len(), "user deleted");
    Ok(())
}

pub fn list_all(state: &AppState, actor: &Actor) -> AppResult<Vec<User>> {
    if !guard::can_manage_users(actor) {
        return Err(AppError::new(ErrorCode::AdminRequired, "Unauthorized"));
    }
    Ok(state.store.list_users(None)?)
}

pub fn list_by_role(state: &AppState, actor: &Actor, role: Role) -> AppResult<Vec<User>> {
    if !guard::can_manage_users(actor) {
        return Err(AppError::new(ErrorCode::AdminRequired, "Unauthorized"));
    }
    Ok(state.store.list_users(Some(role))?)
}

pub fn show(state: &AppState, actor: &Actor, target_id: Uuid) -> AppResult<User> {
    let user = state.store.find_user(target_id)?.ok_or_else(user_not_found)?;
    if !guard::can_view_user(actor, target_id) {
        return Err(AppError::forbidden("Unauthorized"));
    }
    Ok(user)
}

pub fn profile(state: &AppState, actor: &Actor) -> AppResult<User> {
    state.store.find_user(actor.id)?.ok_or_else(user_not_found)
}

/// Creates the configured admin account if it does not exist yet.
pub fn ensure_bootstrap_admin(state: &AppState) -> AppResult<Option<User>> {
    let config = &state.config;
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(None);
    };

    let email = normalize_email(email);
    if state.store.find_user_by_email(&email)?.is_some() {
        tracing::debug!(email = %email, "bootstrap admin already present");
        return Ok(None);
    }
    passwords::validate_password(password)?;

    let user = state.store.insert_user(NewUser {
        name: config.bootstrap_admin_name.clone(),
        email,
        password_hash: passwords::hash_password(password)?,
        role: Role::Admin,
        national_id: None,
        phone: None,
    })
    .map_err(user_write_error)?;

    tracing::info!(user_id = %user.id, "bootstrap admin created");
    Ok(Some(user))
}
