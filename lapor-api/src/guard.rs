//! Role and ownership predicates.
//!
//! Every check is a pure function of the calling [`Actor`] and the resource
//! it touches. Callers decide which error to raise when a check fails.

use uuid::Uuid;

use lapor_shared::types::auth::Role;

use crate::models::{Report, ReportStatus, User};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role)
    }
}

pub fn is_admin(actor: &Actor) -> bool {
    matches!(actor.role, Role::Admin)
}

pub fn is_volunteer(actor: &Actor) -> bool {
    matches!(actor.role, Role::Volunteer)
}

/// Admins and volunteers.
pub fn is_staff(actor: &Actor) -> bool {
    match actor.role {
        Role::Admin | Role::Volunteer => true,
        Role::Citizen => false,
    }
}

pub fn is_owner(actor: &Actor, report: &Report) -> bool {
    actor.id == report.user_id
}

pub fn can_view_report(actor: &Actor, report: &Report) -> bool {
    is_staff(actor) || is_owner(actor, report)
}

/// Owners keep write access to content only while the report is pending.
pub fn can_edit_report_content(actor: &Actor, report: &Report) -> bool {
    is_owner(actor, report) && report.status == ReportStatus::Pending
}

pub fn can_triage_report(actor: &Actor) -> bool {
    is_staff(actor)
}

pub fn can_delete_report(actor: &Actor, report: &Report) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Volunteer | Role::Citizen => {
            is_owner(actor, report) && report.status == ReportStatus::Pending
        }
    }
}

pub fn can_manage_users(actor: &Actor) -> bool {
    is_admin(actor)
}

pub fn can_view_user(actor: &Actor, target_id: Uuid) -> bool {
    is_admin(actor) || actor.id == target_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(owner: Uuid, status: ReportStatus) -> Report {
        let now = Utc::now();
        Report {
            id: Uuid::now_v7(),
            user_id: owner,
            photo_path: "reports/a.jpg".into(),
            location: "Jl. Merdeka 1".into(),
            problem_type: Some("infrastructure".into()),
            description: "Lubang besar di jalan".into(),
            status,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn staff_is_admin_or_volunteer() {
        let id = Uuid::now_v7();
        assert!(is_staff(&Actor::new(id, Role::Admin)));
        assert!(is_staff(&Actor::new(id, Role::Volunteer)));
        assert!(!is_staff(&Actor::new(id, Role::Citizen)));
    }

    #[test]
    fn owner_edits_only_while_pending() {
        let citizen = Actor::new(Uuid::now_v7(), Role::Citizen);
        assert!(can_edit_report_content(&citizen, &report(citizen.id, ReportStatus::Pending)));
        for status in [ReportStatus::InProgress, ReportStatus::Resolved, ReportStatus::Rejected] {
            assert!(!can_edit_report_content(&citizen, &report(citizen.id, status)));
            // read access survives
            assert!(can_view_report(&citizen, &report(citizen.id, status)));
        }
    }

    #[test]
    fn strangers_cannot_touch_reports() {
        let citizen = Actor::new(Uuid::now_v7(), Role::Citizen);
        let other = report(Uuid::now_v7(), ReportStatus::Pending);
        assert!(!can_view_report(&citizen, &other));
        assert!(!can_edit_report_content(&citizen, &other));
        assert!(!can_delete_report(&citizen, &other));
        assert!(!can_triage_report(&citizen));
    }

    #[test]
    fn deletion_rules() {
        let admin = Actor::new(Uuid::now_v7(), Role::Admin);
        let volunteer = Actor::new(Uuid::now_v7(), Role::Volunteer);
        let resolved = report(Uuid::now_v7(), ReportStatus::Resolved);

        assert!(can_delete_report(&admin, &resolved));
        assert!(!can_delete_report(&volunteer, &resolved));
        assert!(can_delete_report(&volunteer, &report(volunteer.id, ReportStatus::Pending)));
    }

    #[test]
    fn user_management_is_admin_only() {
        let admin = Actor::new(Uuid::now_v7(), Role::Admin);
        let volunteer = Actor::new(Uuid::now_v7(), Role::Volunteer);
        assert!(can_manage_users(&admin));
        assert!(!can_manage_users(&volunteer));
        assert!(can_view_user(&volunteer, volunteer.id));
        assert!(!can_view_user(&volunteer, admin.id));
        assert!(can_view_user(&admin, volunteer.id));
    }
}
