use super::common::success_response;
use crate::{
    auth::AuthUser,
    entities::delivery_note::DeliveryNoteStatus,
    errors::ServiceError,
    handlers::AppState,
    services::delivery_notes::LIST_LIMIT,
    storage::UploadedFile,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

/// Upper bound for one documentation upload request (all parts).
const UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct DeliveryNoteFilters {
    /// Matches note number or purchase order number
    pub search: Option<String>,
    /// draft, sent or received
    pub status: Option<String>,
}

/// Multipart form accepted by the documentation upload.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct DocumentationUploadForm {
    /// One or more JPEG, PNG or PDF parts named `files`
    pub files: Vec<String>,
    /// Optional remark stored with every uploaded file
    pub note: Option<String>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<DeliveryNoteStatus>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => DeliveryNoteStatus::from_str(&value.to_ascii_lowercase())
            .map(Some)
            .map_err(|_| {
                ServiceError::validation(format!(
                    "unknown delivery note status '{}'; expected draft, sent or received",
                    value
                ))
            }),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/delivery-notes",
    params(
        DeliveryNoteFilters
    ),
    responses(
        (status = 200, description = "Newest delivery notes", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    tag = "delivery-notes"
)]
pub async fn list_delivery_notes(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filters): Query<DeliveryNoteFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = parse_status(filters.status.as_deref())?;
    let notes = state
        .services
        .delivery_notes
        .list(filters.search, status)
        .await?;

    Ok(success_response(serde_json::json!({
        "delivery_notes": notes,
        "total": notes.len(),
        "limit": LIST_LIMIT,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/delivery-notes/{id}",
    params(
        ("id" = i64, Path, description = "Delivery note ID")
    ),
    responses(
        (status = 200, description = "Delivery note with lines and documentation", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Delivery note not found", body = crate::errors::ErrorResponse)
    ),
    tag = "delivery-notes"
)]
pub async fn get_delivery_note(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let note = state.services.delivery_notes.get(id).await?;
    Ok(success_response(note))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/delivery-notes/{id}/documentation",
    request_body(content = DocumentationUploadForm, content_type = "multipart/form-data"),
    params(
        ("id" = i64, Path, description = "Delivery note ID")
    ),
    responses(
        (status = 200, description = "Documentation attached", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "No files, too many files or unsupported type", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a manager of the order's primary warehouse", body = crate::errors::ErrorResponse),
        (status = 404, description = "Delivery note not found", body = crate::errors::ErrorResponse)
    ),
    tag = "delivery-notes"
)]
pub async fn upload_documentation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut files = Vec::new();
    let mut note = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(delivery_note_id = id, "malformed multipart body: {}", e);
        ServiceError::validation(format!("malformed multipart body: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    ServiceError::validation(format!("failed to read file {}: {}", filename, e))
                })?;
                files.push(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "note" | "catatan" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::validation(format!("invalid note field: {}", e)))?;
                note = Some(text);
            }
            other => {
                warn!(delivery_note_id = id, field = other, "ignoring unknown multipart field");
            }
        }
    }

    let upload = state
        .services
        .delivery_notes
        .upload_documentation(id, user.user_id, files, note)
        .await?;

    info!(
        delivery_note_id = id,
        uploaded = upload.uploaded,
        status = %upload.status,
        "Delivery note documentation uploaded"
    );

    Ok(success_response(upload))
}

/// Creates the router for delivery note endpoints
pub fn delivery_note_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_delivery_notes))
        .route("/:id", get(get_delivery_note))
        .route(
            "/:id/documentation",
            post(upload_documentation).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}
