//! Incident reports.
//!
//! A report starts `pending`. Staff (admins and volunteers) triage it by
//! moving the status between any of the four values and by writing admin
//! notes. The owner may edit the content, photo included, only while the
//! report is still pending.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer};
use uuid::Uuid;
use validator::Validate;

use lapor_shared::errors::{AppError, AppResult, ErrorCode};

use crate::blob::{self, PhotoUpload};
use crate::guard::{self, Actor};
use crate::models::{NewReport, OwnerSummary, Report, ReportFilter, ReportStatus, ReportView};
use crate::services::FieldErrors;
use crate::AppState;

const LOCATION_MAX_LEN: usize = 255;
const PROBLEM_TYPE_MAX_LEN: usize = 100;
const DESCRIPTION_MAX_LEN: usize = 1000;
const ADMIN_NOTES_MAX_LEN: usize = 1000;

const PROBLEM_TYPES: [(&str, &str); 8] = [
    ("infrastructure", "Infrastruktur"),
    ("electricity", "Listrik"),
    ("water_supply", "Sumber Air"),
    ("waste_management", "Pengelolaan Sampah"),
    ("public_safety", "Keamanan Publik"),
    ("public_health", "Kesehatan Publik"),
    ("environmental", "Lingkungan"),
    ("other", "Lainnya"),
];

/// Content of a new report. Any `status` sent by the client is dropped.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReportFields {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "the location is required and may not be greater than 255 characters"))]
    pub location: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "the problem_type is required and may not be greater than 100 characters"))]
    pub problem_type: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 1000, message = "the description is required and may not be greater than 1000 characters"))]
    pub description: String,
}

impl ReportFields {
    /// Surrounding whitespace does not count towards a field's content.
    fn trimmed(self) -> Self {
        Self {
            location: self.location.trim().to_string(),
            problem_type: self.problem_type.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}

/// Partial update. Which fields count depends on who sends it: staff may
/// only triage, the owner may only touch content.
#[derive(Debug, Default, Deserialize)]
pub struct ReportChanges {
    pub location: Option<String>,
    pub problem_type: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// `Some(None)` clears the notes.
    #[serde(default, deserialize_with = "double_option")]
    pub admin_notes: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Staff-only listing filters. Ignored for citizens.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListFilters {
    pub status: Option<String>,
    pub problem_type: Option<String>,
}

pub fn problem_type_catalog() -> BTreeMap<&'static str, &'static str> {
    PROBLEM_TYPES.into_iter().collect()
}

fn report_not_found() -> AppError {
    AppError::new(ErrorCode::ReportNotFound, "Report not found")
}

fn not_editable() -> AppError {
    AppError::new(ErrorCode::ReportNotEditable, "Report can no longer be changed")
}

fn parse_status(errors: &mut FieldErrors, value: &str) -> Option<ReportStatus> {
    match value.parse::<ReportStatus>() {
        Ok(status) => Some(status),
        Err(_) => {
            errors.add("status", "the selected status is invalid");
            None
        }
    }
}

fn check_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, format!("the {field} may not be empty"));
    } else if value.chars().count() > max {
        errors.add(field, format!("the {field} may not be greater than {max} characters"));
    }
}

fn find(state: &AppState, id: Uuid) -> AppResult<Report> {
    state.store.find_report(id)?.ok_or_else(report_not_found)
}

/// Stores an uploaded photo under a fresh key and returns its path.
async fn store_photo(state: &AppState, photo: PhotoUpload) -> AppResult<String> {
    let ext = photo.validate(state.config.max_photo_bytes)?;
    let key = blob::report_photo_key(ext);
    state
        .blobs
        .put(&key, photo.bytes, &photo.content_type)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %key, "photo upload failed");
            AppError::new(ErrorCode::PhotoUploadFailed, "Failed to store the photo")
        })
}

fn view(state: &AppState, report: Report, owner: Option<OwnerSummary>) -> ReportView {
    ReportView {
        photo_url: state.blobs.url(&report.photo_path),
        report,
        owner,
    }
}

fn owner_of(state: &AppState, report: &Report) -> AppResult<Option<OwnerSummary>> {
    Ok(state
        .store
        .find_user(report.user_id)?
        .as_ref()
        .map(OwnerSummary::from))
}

pub fn with_view(state: &AppState, report: Report, with_owner: bool) -> AppResult<ReportView> {
    let owner = if with_owner { owner_of(state, &report)? } else { None };
    Ok(view(state, report, owner))
}

/// Records a report whose photo is already in blob storage.
pub async fn create(
    state: &AppState,
    actor: &Actor,
    photo_path: &str,
    fields: ReportFields,
) -> AppResult<Report> {
    let fields = fields.trimmed();
    fields.validate()?;
    if photo_path.is_empty() {
        return Err(AppError::invalid_field("photo", "the photo field is required"));
    }
    if !state.blobs.exists(photo_path).await? {
        return Err(AppError::with_details(
            ErrorCode::PhotoMissing,
            "the photo does not reference a stored upload",
            serde_json::json!({ "photo": ["the photo does not reference a stored upload"] }),
        ));
    }

    let report = state.store.insert_report(NewReport {
        user_id: actor.id,
        photo_path: photo_path.to_string(),
        location: fields.location,
        problem_type: Some(fields.problem_type),
        description: fields.description,
    })?;

    tracing::info!(actor_id = %actor.id, report_id = %report.id, "report created");
    Ok(report)
}

/// Uploads the photo, then records the report. The upload is released
/// again if the report cannot be recorded.
pub async fn submit(
    state: &AppState,
    actor: &Actor,
    fields: ReportFields,
    photo: Option<PhotoUpload>,
) -> AppResult<Report> {
    let fields = fields.trimmed();
    fields.validate()?;
    let photo = photo.ok_or_else(|| AppError::invalid_field("photo", "the photo field is required"))?;
    let path = store_photo(state, photo).await?;

    match create(state, actor, &path, fields).await {
        Ok(report) => Ok(report),
        Err(e) => {
            blob::release(state.blobs.as_ref(), &path).await;
            Err(e)
        }
    }
}

/// Staff see every report, optionally filtered. Everyone else sees only
/// their own, unfiltered. Newest first either way.
pub fn list(
    state: &AppState,
    actor: &Actor,
    filters: ListFilters,
    with_owner: bool,
) -> AppResult<Vec<ReportView>> {
    let filter = if guard::is_staff(actor) {
        let mut errors = FieldErrors::default();
        let status = filters.status.as_deref().and_then(|s| parse_status(&mut errors, s));
        errors.into_result()?;
        ReportFilter {
            owner: None,
            status,
            problem_type: filters.problem_type,
        }
    } else {
        ReportFilter {
            owner: Some(actor.id),
            ..ReportFilter::default()
        }
    };

    let reports = state.store.list_reports(&filter)?;
    if !with_owner {
        return Ok(reports.into_iter().map(|r| view(state, r, None)).collect());
    }

    let mut owners: HashMap<Uuid, Option<OwnerSummary>> = HashMap::new();
    let mut views = Vec::with_capacity(reports.len());
    for report in reports {
        let owner = match owners.get(&report.user_id) {
            Some(owner) => owner.clone(),
            None => {
                let owner = owner_of(state, &report)?;
                owners.insert(report.user_id, owner.clone());
                owner
            }
        };
        views.push(view(state, report, owner));
    }
    Ok(views)
}

pub fn get(state: &AppState, actor: &Actor, id: Uuid, with_owner: bool) -> AppResult<ReportView> {
    let report = find(state, id)?;
    if !guard::can_view_report(actor, &report) {
        return Err(AppError::forbidden("You are not allowed to view this report"));
    }
    with_view(state, report, with_owner)
}

pub async fn update(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    changes: ReportChanges,
    photo: Option<PhotoUpload>,
) -> AppResult<Report> {
    let report = find(state, id)?;

    if guard::can_triage_report(actor) {
        return triage(state, actor, report, changes);
    }
    if guard::can_edit_report_content(actor, &report) {
        return edit_content(state, actor, report, changes, photo).await;
    }
    if guard::is_owner(actor, &report) {
        return Err(not_editable());
    }
    Err(AppError::forbidden("You are not allowed to change this report"))
}

fn triage(state: &AppState, actor: &Actor, mut report: Report, changes: ReportChanges) -> AppResult<Report> {
    let mut errors = FieldErrors::default();
    let status = changes.status.as_deref().and_then(|s| parse_status(&mut errors, s));
    if let Some(Some(notes)) = &changes.admin_notes {
        if notes.chars().count() > ADMIN_NOTES_MAX_LEN {
            errors.add(
                "admin_notes",
                format!("the admin_notes may not be greater than {ADMIN_NOTES_MAX_LEN} characters"),
            );
        }
    }
    errors.into_result()?;

    let previous = report.status;
    if let Some(status) = status {
        report.status = status;
    }
    if let Some(notes) = changes.admin_notes {
        report.admin_notes = notes;
    }

    let report = state.store.update_report(&report)?;
    tracing::info!(
        actor_id = %actor.id,
        report_id = %report.id,
        from = %previous,
        to = %report.status,
        "report triaged"
    );
    Ok(report)
}

async fn edit_content(
    state: &AppState,
    actor: &Actor,
    mut report: Report,
    changes: ReportChanges,
    photo: Option<PhotoUpload>,
) -> AppResult<Report> {
    let mut errors = FieldErrors::default();
    if let Some(location) = changes.location.as_deref() {
        check_text(&mut errors, "location", location, LOCATION_MAX_LEN);
    }
    if let Some(problem_type) = changes.problem_type.as_deref() {
        check_text(&mut errors, "problem_type", problem_type, PROBLEM_TYPE_MAX_LEN);
    }
    if let Some(description) = changes.description.as_deref() {
        check_text(&mut errors, "description", description, DESCRIPTION_MAX_LEN);
    }
    errors.into_result()?;

    if let Some(location) = changes.location {
        report.location = location.trim().to_string();
    }
    if let Some(problem_type) = changes.problem_type {
        report.problem_type = Some(problem_type.trim().to_string());
    }
    if let Some(description) = changes.description {
        report.description = description.trim().to_string();
    }

    let replaced = match photo {
        Some(photo) => {
            let path = store_photo(state, photo).await?;
            Some(std::mem::replace(&mut report.photo_path, path))
        }
        None => None,
    };

    let updated = match state.store.update_report(&report) {
        Ok(updated) => updated,
        Err(e) => {
            if replaced.is_some() {
                blob::release(state.blobs.as_ref(), &report.photo_path).await;
            }
            return Err(e.into());
        }
    };
    if let Some(old) = replaced {
        blob::release(state.blobs.as_ref(), &old).await;
    }

    tracing::info!(actor_id = %actor.id, report_id = %updated.id, "report updated");
    Ok(updated)
}

pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    let report = find(state, id)?;
    if !guard::can_delete_report(actor, &report) {
        if guard::is_owner(actor, &report) {
            return Err(not_editable());
        }
        return Err(AppError::forbidden("You are not allowed to delete this report"));
    }

    if !state.store.delete_report(report.id)? {
        return Err(report_not_found());
    }
    blob::release(state.blobs.as_ref(), &report.photo_path).await;

    tracing::info!(actor_id = %actor.id, report_id = %report.id, "report deleted");
    Ok(())
}
