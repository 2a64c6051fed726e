//! Persistence seam.
//!
//! Every read and write of users, sessions and reports goes through [`Store`].
//! Each method is a single atomic unit at the storage layer; concurrent
//! updates to the same row are last-write-wins.

mod pg;
#[cfg(test)]
pub mod memory;

pub use pg::PgStore;

use uuid::Uuid;

use lapor_shared::types::auth::Role;

use crate::models::{
    AccessToken, NewReport, NewSession, NewUser, RefreshToken, Report, ReportFilter, User,
};

/// A user write hit a unique column already held by someone else.
///
/// Returned inside the `anyhow::Error` of [`Store::insert_user`] and
/// [`Store::update_user`] so callers can `downcast_ref` it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UniqueViolation {
    #[error("email already taken")]
    Email,
    #[error("national id already taken")]
    NationalId,
}

pub trait Store: Send + Sync {
    // Users
    fn insert_user(&self, user: NewUser) -> anyhow::Result<User>;
    fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// True if another user (not `except`) already holds this email.
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> anyhow::Result<bool>;
    fn national_id_taken(&self, national_id: &str, except: Option<Uuid>) -> anyhow::Result<bool>;
    fn update_user(&self, user: &User) -> anyhow::Result<User>;
    /// Deletes the user; reports and tokens go with it. Returns false if absent.
    fn delete_user(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Newest first.
    fn list_users(&self, role: Option<Role>) -> anyhow::Result<Vec<User>>;

    // Sessions
    /// Drops every access and refresh token of the user, then stores the new pair.
    fn start_session(&self, session: NewSession) -> anyhow::Result<()>;
    fn find_refresh_token(&self, token_hash: &str) -> anyhow::Result<Option<RefreshToken>>;
    fn delete_refresh_token(&self, id: Uuid) -> anyhow::Result<()>;
    fn count_refresh_tokens(&self, user_id: Uuid) -> anyhow::Result<i64>;
    fn find_access_token(&self, id: Uuid) -> anyhow::Result<Option<AccessToken>>;
    fn revoke_sessions(&self, user_id: Uuid) -> anyhow::Result<()>;

    // Reports
    fn insert_report(&self, report: NewReport) -> anyhow::Result<Report>;
    fn find_report(&self, id: Uuid) -> anyhow::Result<Option<Report>>;
    /// Newest first.
    fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>>;
    fn update_report(&self, report: &Report) -> anyhow::Result<Report>;
    fn delete_report(&self, id: Uuid) -> anyhow::Result<bool>;

    fn ping(&self) -> anyhow::Result<()>;
}
