use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lapor_shared::types::auth::Role;

// --- User ---

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// National identity number (NIK), volunteers only.
    #[serde(rename = "nik")]
    pub national_id: Option<String>,
    #[serde(rename = "no_telp")]
    pub phone: Option<String>,
    /// Student number (NIM).
    #[serde(rename = "nim")]
    pub student_id: Option<String>,
    #[serde(rename = "jurusan")]
    pub major: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub national_id: Option<String>,
    pub phone: Option<String>,
}

/// Owner fields embedded in report responses when `with_owner` is requested.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

// --- Sessions ---

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything written when a user gets a fresh token pair. Applying it
/// replaces every token the user held before.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub access_token_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
}

// --- Report ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Pending,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
        ReportStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "in_progress" => Ok(ReportStatus::InProgress),
            "resolved" => Ok(ReportStatus::Resolved),
            "rejected" => Ok(ReportStatus::Rejected),
            _ => Err(format!("unknown report status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub photo_path: String,
    pub location: String,
    pub problem_type: Option<String>,
    pub description: String,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub user_id: Uuid,
    pub photo_path: String,
    pub location: String,
    pub problem_type: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub owner: Option<Uuid>,
    pub status: Option<ReportStatus>,
    pub problem_type: Option<String>,
}

/// Report as returned over the API: the stored row plus its resolved photo
/// URL and, on request, the owner.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    pub photo_url: String,
    #[serde(rename = "user", skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in ReportStatus::ALL {
            assert_eq!(status.as_str().parse::<ReportStatus>().unwrap(), status);
        }
        assert!("done".parse::<ReportStatus>().is_err());
        assert!("Pending".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            name: "Relawan Example".into(),
            email: "relawan@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Volunteer,
            national_id: Some("1234567890123456".into()),
            phone: Some("081234567890".into()),
            student_id: None,
            major: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["role"], "volunteer");
        assert_eq!(value["nik"], "1234567890123456");
        assert_eq!(value["no_telp"], "081234567890");
    }
}
