use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use lapor_shared::clients::db::DbPool;
use lapor_shared::types::auth::Role;

use crate::models::{
    AccessToken, NewReport, NewSession, NewUser, RefreshToken, Report, ReportFilter, User,
};
use crate::schema::{access_tokens, refresh_tokens, reports, users};

use super::{Store, UniqueViolation};

// --- Rows ---

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    nik: Option<String>,
    no_telp: Option<String>,
    nim: Option<String>,
    jurusan: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> anyhow::Result<Self> {
        let role = row.role.parse::<Role>().map_err(anyhow::Error::msg)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            national_id: row.nik,
            phone: row.no_telp,
            student_id: row.nim,
            major: row.jurusan,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUserRow<'a> {
    id: Uuid,
    name: &'a str,
    email: &'a str,
    password_hash: &'a str,
    role: &'a str,
    nik: Option<&'a str>,
    no_telp: Option<&'a str>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
struct UserChangeset<'a> {
    name: &'a str,
    email: &'a str,
    password_hash: &'a str,
    role: &'a str,
    nik: Option<&'a str>,
    no_telp: Option<&'a str>,
    nim: Option<&'a str>,
    jurusan: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
struct NewRefreshTokenRow<'a> {
    id: Uuid,
    user_id: Uuid,
    token_hash: &'a str,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = access_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AccessTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = access_tokens)]
struct NewAccessTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReportRow {
    id: Uuid,
    user_id: Uuid,
    photo_path: String,
    location: String,
    problem_type: Option<String>,
    description: String,
    status: String,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = anyhow::Error;

    fn try_from(row: ReportRow) -> anyhow::Result<Self> {
        let status = row.status.parse().map_err(anyhow::Error::msg)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            photo_path: row.photo_path,
            location: row.location,
            problem_type: row.problem_type,
            description: row.description,
            status,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reports)]
struct NewReportRow<'a> {
    id: Uuid,
    user_id: Uuid,
    photo_path: &'a str,
    location: &'a str,
    problem_type: Option<&'a str>,
    description: &'a str,
    status: &'a str,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = reports)]
#[diesel(treat_none_as_null = true)]
struct ReportChangeset<'a> {
    photo_path: &'a str,
    location: &'a str,
    problem_type: Option<&'a str>,
    description: &'a str,
    status: &'a str,
    admin_notes: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

// --- Store ---

/// Postgres-backed store over an r2d2 pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> anyhow::Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().context("db pool error")
    }
}

const EMAIL_CONSTRAINT: &str = "users_email_key";
const NATIONAL_ID_CONSTRAINT: &str = "users_nik_key";

/// Turns a unique violation on the users table into [`UniqueViolation`].
fn user_write_error(err: DieselError) -> anyhow::Error {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &err {
        match info.constraint_name() {
            Some(EMAIL_CONSTRAINT) => return UniqueViolation::Email.into(),
            Some(NATIONAL_ID_CONSTRAINT) => return UniqueViolation::NationalId.into(),
            _ => {}
        }
    }
    err.into()
}

impl Store for PgStore {
    fn insert_user(&self, user: NewUser) -> anyhow::Result<User> {
        let mut conn = self.conn()?;
        let row = NewUserRow {
            id: Uuid::now_v7(),
            name: &user.name,
            email: &user.email,
            password_hash: &user.password_hash,
            role: user.role.as_str(),
            nik: user.national_id.as_deref(),
            no_telp: user.phone.as_deref(),
        };

        let inserted: UserRow = diesel::insert_into(users::table)
            .values(&row)
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .map_err(user_write_error)?;

        inserted.try_into()
    }

    fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .find(id)
            .select(UserRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .filter(users::email.eq(email))
            .select(UserRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        let mut query = users::table.filter(users::email.eq(email)).into_boxed();
        if let Some(id) = except {
            query = query.filter(users::id.ne(id));
        }
        let count: i64 = query.count().get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn national_id_taken(&self, national_id: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        let mut query = users::table.filter(users::nik.eq(national_id)).into_boxed();
        if let Some(id) = except {
            query = query.filter(users::id.ne(id));
        }
        let count: i64 = query.count().get_result(&mut conn)?;
        Ok(count > 0)
    }

    fn update_user(&self, user: &User) -> anyhow::Result<User> {
        let mut conn = self.conn()?;
        let changes = UserChangeset {
            name: &user.name,
            email: &user.email,
            password_hash: &user.password_hash,
            role: user.role.as_str(),
            nik: user.national_id.as_deref(),
            no_telp: user.phone.as_deref(),
            nim: user.student_id.as_deref(),
            jurusan: user.major.as_deref(),
            updated_at: Utc::now(),
        };

        let updated: UserRow = diesel::update(users::table.find(user.id))
            .set(&changes)
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .map_err(user_write_error)?;

        updated.try_into()
    }

    fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        // reports, refresh_tokens and access_tokens cascade on the foreign key
        let deleted = diesel::delete(users::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn list_users(&self, role: Option<Role>) -> anyhow::Result<Vec<User>> {
        let mut conn = self.conn()?;
        let mut query = users::table.select(UserRow::as_select()).into_boxed();
        if let Some(role) = role {
            query = query.filter(users::role.eq(role.as_str()));
        }

        query
            .order((users::created_at.desc(), users::id.desc()))
            .load::<UserRow>(&mut conn)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    fn start_session(&self, session: NewSession) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(access_tokens::table.filter(access_tokens::user_id.eq(session.user_id)))
                .execute(conn)?;
            diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(session.user_id)))
                .execute(conn)?;

            diesel::insert_into(access_tokens::table)
                .values(&NewAccessTokenRow {
                    id: session.access_token_id,
                    user_id: session.user_id,
                    expires_at: session.access_expires_at,
                })
                .execute(conn)?;

            diesel::insert_into(refresh_tokens::table)
                .values(&NewRefreshTokenRow {
                    id: Uuid::now_v7(),
                    user_id: session.user_id,
                    token_hash: &session.refresh_token_hash,
                    expires_at: session.refresh_expires_at,
                })
                .execute(conn)?;

            Ok(())
        })?;
        Ok(())
    }

    fn find_refresh_token(&self, token_hash: &str) -> anyhow::Result<Option<RefreshToken>> {
        let mut conn = self.conn()?;
        let row = refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(token_hash))
            .select(RefreshTokenRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(RefreshToken::from))
    }

    fn delete_refresh_token(&self, id: Uuid) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        diesel::delete(refresh_tokens::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    fn count_refresh_tokens(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let mut conn = self.conn()?;
        let count = refresh_tokens::table
            .filter(refresh_tokens::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    fn find_access_token(&self, id: Uuid) -> anyhow::Result<Option<AccessToken>> {
        let mut conn = self.conn()?;
        let row = access_tokens::table
            .find(id)
            .select(AccessTokenRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(AccessToken::from))
    }

    fn revoke_sessions(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(access_tokens::table.filter(access_tokens::user_id.eq(user_id)))
                .execute(conn)?;
            diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
                .execute(conn)?;
            Ok(())
        })?;
        Ok(())
    }

    fn insert_report(&self, report: NewReport) -> anyhow::Result<Report> {
        let mut conn = self.conn()?;
        let row = NewReportRow {
            id: Uuid::now_v7(),
            user_id: report.user_id,
            photo_path: &report.photo_path,
            location: &report.location,
            problem_type: report.problem_type.as_deref(),
            description: &report.description,
            status: crate::models::ReportStatus::Pending.as_str(),
        };

        let inserted: ReportRow = diesel::insert_into(reports::table)
            .values(&row)
            .returning(ReportRow::as_returning())
            .get_result(&mut conn)?;

        inserted.try_into()
    }

    fn find_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        let mut conn = self.conn()?;
        reports::table
            .find(id)
            .select(ReportRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Report::try_from)
            .transpose()
    }

    fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        let mut conn = self.conn()?;
        let mut query = reports::table.select(ReportRow::as_select()).into_boxed();
        if let Some(owner) = filter.owner {
            query = query.filter(reports::user_id.eq(owner));
        }
        if let Some(status) = filter.status {
            query = query.filter(reports::status.eq(status.as_str()));
        }
        if let Some(ref problem_type) = filter.problem_type {
            query = query.filter(reports::problem_type.eq(problem_type));
        }

        query
            .order((reports::created_at.desc(), reports::id.desc()))
            .load::<ReportRow>(&mut conn)?
            .into_iter()
            .map(Report::try_from)
            .collect()
    }

    fn update_report(&self, report: &Report) -> anyhow::Result<Report> {
        let mut conn = self.conn()?;
        let changes = ReportChangeset {
            photo_path: &report.photo_path,
            location: &report.location,
            problem_type: report.problem_type.as_deref(),
            description: &report.description,
            status: report.status.as_str(),
            admin_notes: report.admin_notes.as_deref(),
            updated_at: Utc::now(),
        };

        let updated: ReportRow = diesel::update(reports::table.find(report.id))
            .set(&changes)
            .returning(ReportRow::as_returning())
            .get_result(&mut conn)?;

        updated.try_into()
    }

    fn delete_report(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(reports::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}
