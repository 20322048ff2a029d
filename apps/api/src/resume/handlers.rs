//! Axum route handlers for the Resume API.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::extraction::PDF_MEDIA_TYPE;
use crate::generation::Provider;
use crate::identity::Identity;
use crate::models::resume::ResumeRow;
use crate::resume::pipeline::PipelineOutput;
use crate::resume::repository::{get_resume, upsert_resume, ResumeRecord};
use crate::state::AppState;

/// Multipart field carrying the uploaded PDF.
const UPLOAD_FIELD: &str = "file";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecompileRequest {
    pub latex: String,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub job_id: String,
    pub latex: String,
    pub provider: Option<Provider>,
    /// Public URL with a cache-busting `t` parameter.
    pub pdf_url: String,
    pub storage_path: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/upload
///
/// Multipart upload of a PDF résumé. Extracts its text, generates LaTeX,
/// compiles and publishes it.
pub async fn handle_upload(
    State(state): State<AppState>,
    identity: Identity,
    multipart: Multipart,
) -> Result<Json<ResumeResponse>, AppError> {
    let pdf = read_pdf_field(multipart).await?;
    let output = state
        .pipeline
        .generate_from_pdf(pdf.to_vec(), &identity)
        .await?;
    respond(&state, &identity, output).await
}

/// POST /api/v1/resumes/recompile
///
/// Sanitizes and compiles user-edited LaTeX. On failure the response carries
/// the compiler log.
pub async fn handle_recompile(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<RecompileRequest>,
) -> Result<Json<ResumeResponse>, AppError> {
    if request.latex.trim().is_empty() {
        return Err(AppError::Validation("latex cannot be empty".to_string()));
    }
    let output = state.pipeline.recompile(&request.latex, &identity).await?;
    respond(&state, &identity, output).await
}

/// GET /api/v1/resumes/latest
///
/// The caller's most recently published résumé. Guests have none.
pub async fn handle_latest(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ResumeRow>, AppError> {
    let user_id = identity.user_id().ok_or(AppError::Unauthorized)?;
    let resume = get_resume(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No resume for user {user_id}")))?;
    Ok(Json(resume))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Persists the result for authenticated users and shapes the response.
async fn respond(
    state: &AppState,
    identity: &Identity,
    output: PipelineOutput,
) -> Result<Json<ResumeResponse>, AppError> {
    let PipelineOutput {
        job_id,
        latex,
        provider,
        artifact,
    } = output;

    if let Some(user_id) = identity.user_id() {
        upsert_resume(
            &state.db,
            ResumeRecord {
                user_id,
                latex_source: &latex,
                pdf_url: &artifact.public_url,
                storage_path: &artifact.storage_path,
                provider: provider.map(|p| p.as_str()),
            },
        )
        .await?;
    }

    Ok(Json(ResumeResponse {
        job_id,
        latex,
        provider,
        pdf_url: cache_busted(&artifact.public_url),
        storage_path: artifact.storage_path,
    }))
}

fn cache_busted(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}t={}", Utc::now().timestamp_millis())
}

async fn read_pdf_field(mut multipart: Multipart) -> Result<Bytes, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if field.content_type() != Some(PDF_MEDIA_TYPE) {
            return Err(AppError::UnsupportedMediaType(format!(
                "'{UPLOAD_FIELD}' must be sent as {PDF_MEDIA_TYPE}"
            )));
        }
        return field.bytes().await.map_err(multipart_error);
    }
    Err(AppError::Validation(format!(
        "multipart field '{UPLOAD_FIELD}' is required"
    )))
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(error.body_text())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", error.body_text()))
    }
}
