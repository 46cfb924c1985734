//! services/api/src/web/documents.rs
//!
//! Upload, removal and listing of a user's PDFs.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::port_error_response;
use crate::storage::{is_pdf_filename, validate_filename};
use crate::web::state::{AppState, AuthUser};

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    /// Zero when the PDF had no extractable text; the file is kept but unsearchable.
    pub chunks_indexed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct RemoveResponse {
    pub message: String,
}

/// Reads the first file part of the form.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), format!("Failed to read multipart data: {}", e.body_text())))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        // Oversized bodies surface here as 413.
        let data = field
            .bytes()
            .await
            .map_err(|e| (e.status(), format!("Failed to read file bytes: {}", e.body_text())))?;
        return Ok((name, data));
    }
    Err((StatusCode::BAD_REQUEST, "Multipart form must include a file".to_string()))
}

/// Upload a PDF and index it into the caller's library.
#[utoipa::path(
    post,
    path = "/upload_pdf",
    request_body(content_type = "multipart/form-data", description = "The PDF to upload."),
    responses(
        (status = 200, description = "Uploaded and indexed", body = UploadResponse),
        (status = 400, description = "Not a PDF, invalid name or duplicate filename"),
        (status = 401, description = "Invalid or expired token"),
        (status = 413, description = "Upload exceeds the body limit"),
        (status = 500, description = "Indexing failed; the upload was rolled back")
    ),
    security(("bearer" = []))
)]
pub async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (filename, data) = read_file_field(&mut multipart).await?;

    if !is_pdf_filename(&filename) {
        return Err((StatusCode::BAD_REQUEST, "Only PDF files are allowed.".to_string()));
    }
    validate_filename(&filename).map_err(port_error_response)?;

    let library = state
        .libraries
        .ensure_user(&user.username)
        .await
        .map_err(port_error_response)?;
    let file_path = library
        .paths()
        .store_pdf(&filename, &data)
        .await
        .map_err(port_error_response)?;

    match state.libraries.ingest(&user.username, &file_path, &filename).await {
        Ok(report) => {
            let message = if report.chunks == 0 {
                format!("PDF '{filename}' uploaded, but it contains no extractable text and is not searchable.")
            } else {
                format!("PDF '{filename}' uploaded and indexed successfully.")
            };
            Ok(Json(UploadResponse {
                message,
                filename,
                chunks_indexed: report.chunks,
            }))
        }
        Err(e) => {
            // Don't keep a file that can never be found by search.
            if let Err(cleanup) = library.paths().remove_pdf(&filename).await {
                warn!("Failed to clean up '{}' after indexing error: {}", filename, cleanup);
            }
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to index document: {}", e),
            ))
        }
    }
}

/// Remove a PDF from storage and from the caller's index.
#[utoipa::path(
    delete,
    path = "/remove_pdf/{filename}",
    params(("filename" = String, Path, description = "Name of the uploaded PDF")),
    responses(
        (status = 200, description = "Removed", body = RemoveResponse),
        (status = 401, description = "Invalid or expired token"),
        (status = 404, description = "PDF not found")
    ),
    security(("bearer" = []))
)]
pub async fn remove_pdf_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let library = state
        .libraries
        .ensure_user(&user.username)
        .await
        .map_err(port_error_response)?;

    if !library.paths().pdf_exists(&filename).await.map_err(port_error_response)? {
        return Err((StatusCode::NOT_FOUND, "PDF not found".to_string()));
    }
    info!("Delete request received for: {} (user '{}')", filename, user.username);

    // Remove from the index first, then the physical file.
    state
        .libraries
        .remove(&user.username, &filename)
        .await
        .map_err(|e| {
            error!("Failed to remove '{}' from index: {:?}", filename, e);
            port_error_response(e)
        })?;

    library
        .paths()
        .remove_pdf(&filename)
        .await
        .map_err(port_error_response)?;
    info!("Physical file deleted: {}", filename);

    Ok(Json(RemoveResponse {
        message: format!("PDF '{filename}' removed successfully from storage and vector database."),
    }))
}

/// List the caller's PDFs, sorted by name.
#[utoipa::path(
    get,
    path = "/list_pdfs",
    responses(
        (status = 200, description = "Sorted filenames", body = [String]),
        (status = 401, description = "Invalid or expired token")
    ),
    security(("bearer" = []))
)]
pub async fn list_pdfs_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let library = state
        .libraries
        .ensure_user(&user.username)
        .await
        .map_err(port_error_response)?;
    let pdfs = library.paths().list_pdfs().await.map_err(port_error_response)?;
    Ok(Json(pdfs))
}
