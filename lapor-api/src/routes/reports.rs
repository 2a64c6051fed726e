use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use lapor_shared::errors::{AppError, AppResult, ErrorCode};
use lapor_shared::types::api::{ApiResponse, Empty};

use crate::blob::PhotoUpload;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::guard::Actor;
use crate::models::ReportView;
use crate::services::registry::{self, ListFilters, ReportChanges, ReportFields};
use crate::AppState;

// --- Request / Response types ---

fn default_with_owner() -> bool { true }

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    #[serde(default = "default_with_owner")]
    pub with_owner: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub problem_type: Option<String>,
    #[serde(default = "default_with_owner")]
    pub with_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportBody {
    pub report: ReportView,
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub count: usize,
    pub reports: Vec<ReportView>,
}

#[derive(Debug, Serialize)]
pub struct ProblemTypes {
    pub problem_types: BTreeMap<&'static str, &'static str>,
}

// --- Multipart ---

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::new(ErrorCode::PayloadTooLarge, "the upload is too large");
    }
    AppError::bad_request(e.body_text())
}

/// Splits a multipart body into its text fields and the optional `photo` file.
async fn read_multipart(mut multipart: Multipart) -> AppResult<(HashMap<String, String>, Option<PhotoUpload>)> {
    let mut text = HashMap::new();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "photo" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            // browsers send an empty part when no file was picked
            if !bytes.is_empty() {
                photo = Some(PhotoUpload {
                    bytes: bytes.to_vec(),
                    content_type,
                });
            }
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            text.insert(name, value);
        }
    }

    Ok((text, photo))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"))
}

// --- Handlers ---

pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppQuery(params): AppQuery<ListParams>,
) -> AppResult<Json<ApiResponse<ReportList>>> {
    let filters = ListFilters {
        status: params.status,
        problem_type: params.problem_type,
    };
    let reports = registry::list(&state, &actor, filters, params.with_owner)?;
    let body = ReportList {
        count: reports.len(),
        reports,
    };

    if body.count == 0 {
        return Ok(Json(ApiResponse::ok_with_message(body, "Tidak ada laporan yang ditemukan")));
    }
    Ok(Json(ApiResponse::ok(body)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<ReportBody>>)> {
    let (mut text, photo) = read_multipart(multipart).await?;
    let fields = ReportFields {
        location: text.remove("location").unwrap_or_default(),
        problem_type: text.remove("problem_type").unwrap_or_default(),
        description: text.remove("description").unwrap_or_default(),
    };

    let report = registry::submit(&state, &actor, fields, photo).await?;
    let report = registry::with_view(&state, report, true)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(ReportBody { report }, "Laporan berhasil dibuat")),
    ))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    AppQuery(params): AppQuery<ViewParams>,
) -> AppResult<Json<ApiResponse<ReportBody>>> {
    let report = registry::get(&state, &actor, id, params.with_owner)?;
    Ok(Json(ApiResponse::ok(ReportBody { report })))
}

/// Accepts JSON, or multipart when a replacement photo is attached.
pub async fn update(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    request: Request,
) -> AppResult<Json<ApiResponse<ReportBody>>> {
    let (changes, photo) = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        let (mut text, photo) = read_multipart(multipart).await?;
        let changes = ReportChanges {
            location: text.remove("location"),
            problem_type: text.remove("problem_type"),
            description: text.remove("description"),
            status: text.remove("status"),
            // an empty form value clears the notes
            admin_notes: text
                .remove("admin_notes")
                .map(|notes| if notes.is_empty() { None } else { Some(notes) }),
        };
        (changes, photo)
    } else {
        let AppJson(changes) = AppJson::<ReportChanges>::from_request(request, &state).await?;
        (changes, None)
    };

    let report = registry::update(&state, &actor, id, changes, photo).await?;
    let report = registry::with_view(&state, report, true)?;

    Ok(Json(ApiResponse::ok_with_message(ReportBody { report }, "Laporan berhasil diperbarui")))
}

pub async fn destroy(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    registry::delete(&state, &actor, id).await?;
    Ok(Json(ApiResponse::message("Laporan berhasil dihapus")))
}

pub async fn problem_types() -> Json<ApiResponse<ProblemTypes>> {
    Json(ApiResponse::ok(ProblemTypes {
        problem_types: registry::problem_type_catalog(),
    }))
}
