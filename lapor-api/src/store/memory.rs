use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use lapor_shared::types::auth::Role;

use crate::models::{
    AccessToken, NewReport, NewSession, NewUser, RefreshToken, Report, ReportFilter,
    ReportStatus, User,
};

use super::{Store, UniqueViolation};

#[derive(Default)]
struct Tables {
    // Vec keeps insertion order, which breaks created_at ties
    users: Vec<User>,
    refresh_tokens: Vec<RefreshToken>,
    access_tokens: Vec<AccessToken>,
    reports: Vec<Report>,
}

impl Tables {
    /// Same unique columns as the Postgres users table.
    fn check_unique(
        &self,
        email: &str,
        national_id: Option<&str>,
        except: Option<Uuid>,
    ) -> Result<(), UniqueViolation> {
        let others = || self.users.iter().filter(move |u| Some(u.id) != except);
        if others().any(|u| u.email == email) {
            return Err(UniqueViolation::Email);
        }
        if let Some(nik) = national_id {
            if others().any(|u| u.national_id.as_deref() == Some(nik)) {
                return Err(UniqueViolation::NationalId);
            }
        }
        Ok(())
    }
}

/// In-process store for tests. Mirrors the foreign-key cascades of the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_token_count(&self, user_id: Uuid) -> usize {
        let tables = self.tables.read().unwrap();
        tables.access_tokens.iter().filter(|t| t.user_id == user_id).count()
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    rows.reverse();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

impl Store for MemoryStore {
    fn insert_user(&self, user: NewUser) -> anyhow::Result<User> {
        let mut tables = self.tables.write().unwrap();
        tables.check_unique(&user.email, user.national_id.as_deref(), None)?;
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            national_id: user.national_id,
            phone: user.phone,
            student_id: None,
            major: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .users
            .iter()
            .any(|u| u.email == email && Some(u.id) != except))
    }

    fn national_id_taken(&self, national_id: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .users
            .iter()
            .any(|u| u.national_id.as_deref() == Some(national_id) && Some(u.id) != except))
    }

    fn update_user(&self, user: &User) -> anyhow::Result<User> {
        let mut tables = self.tables.write().unwrap();
        tables.check_unique(&user.email, user.national_id.as_deref(), Some(user.id))?;
        let slot = tables
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} vanished", user.id))?;
        *slot = User {
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(slot.clone())
    }

    fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        tables.reports.retain(|r| r.user_id != id);
        tables.refresh_tokens.retain(|t| t.user_id != id);
        tables.access_tokens.retain(|t| t.user_id != id);
        Ok(true)
    }

    fn list_users(&self, role: Option<Role>) -> anyhow::Result<Vec<User>> {
        let tables = self.tables.read().unwrap();
        let rows = tables
            .users
            .iter()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        Ok(newest_first(rows, |u| u.created_at))
    }

    fn start_session(&self, session: NewSession) -> anyhow::Result<()> {
        let mut tables = self.tables.write().unwrap();
        let now = Utc::now();
        tables.access_tokens.retain(|t| t.user_id != session.user_id);
        tables.refresh_tokens.retain(|t| t.user_id != session.user_id);
        tables.access_tokens.push(AccessToken {
            id: session.access_token_id,
            user_id: session.user_id,
            expires_at: session.access_expires_at,
            created_at: now,
        });
        tables.refresh_tokens.push(RefreshToken {
            id: Uuid::now_v7(),
            user_id: session.user_id,
            token_hash: session.refresh_token_hash,
            expires_at: session.refresh_expires_at,
            created_at: now,
        });
        Ok(())
    }

    fn find_refresh_token(&self, token_hash: &str) -> anyhow::Result<Option<RefreshToken>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .refresh_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    fn delete_refresh_token(&self, id: Uuid) -> anyhow::Result<()> {
        let mut tables = self.tables.write().unwrap();
        tables.refresh_tokens.retain(|t| t.id != id);
        Ok(())
    }

    fn count_refresh_tokens(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let tables = self.tables.read().unwrap();
        Ok(tables.refresh_tokens.iter().filter(|t| t.user_id == user_id).count() as i64)
    }

    fn find_access_token(&self, id: Uuid) -> anyhow::Result<Option<AccessToken>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.access_tokens.iter().find(|t| t.id == id).cloned())
    }

    fn revoke_sessions(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut tables = self.tables.write().unwrap();
        tables.access_tokens.retain(|t| t.user_id != user_id);
        tables.refresh_tokens.retain(|t| t.user_id != user_id);
        Ok(())
    }

    fn insert_report(&self, report: NewReport) -> anyhow::Result<Report> {
        let mut tables = self.tables.write().unwrap();
        if !tables.users.iter().any(|u| u.id == report.user_id) {
            anyhow::bail!("insert on table \"reports\" violates foreign key constraint");
        }
        let now = Utc::now();
        let report = Report {
            id: Uuid::now_v7(),
            user_id: report.user_id,
            photo_path: report.photo_path,
            location: report.location,
            problem_type: report.problem_type,
            description: report.description,
            status: ReportStatus::Pending,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        tables.reports.push(report.clone());
        Ok(report)
    }

    fn find_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        let tables = self.tables.read().unwrap();
        Ok(tables.reports.iter().find(|r| r.id == id).cloned())
    }

    fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        let tables = self.tables.read().unwrap();
        let rows = tables
            .reports
            .iter()
            .filter(|r| filter.owner.map_or(true, |o| r.user_id == o))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                filter
                    .problem_type
                    .as_deref()
                    .map_or(true, |p| r.problem_type.as_deref() == Some(p))
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    fn update_report(&self, report: &Report) -> anyhow::Result<Report> {
        let mut tables = self.tables.write().unwrap();
        let slot = tables
            .reports
            .iter_mut()
            .find(|r| r.id == report.id)
            .ok_or_else(|| anyhow::anyhow!("report {} vanished", report.id))?;
        *slot = Report {
            updated_at: Utc::now(),
            ..report.clone()
        };
        Ok(slot.clone())
    }

    fn delete_report(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tables = self.tables.write().unwrap();
        let before = tables.reports.len();
        tables.reports.retain(|r| r.id != id);
        Ok(tables.reports.len() != before)
    }

    fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
