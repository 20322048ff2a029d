pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::extraction::MAX_PDF_BYTES;
use crate::resume::handlers;
use crate::state::AppState;

/// Headroom over the PDF limit for multipart framing, so oversize files are
/// reported by the size check rather than cut off mid-stream.
const UPLOAD_BODY_LIMIT: usize = MAX_PDF_BYTES + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/resumes/upload",
            post(handlers::handle_upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/v1/resumes/recompile", post(handlers::handle_recompile))
        .route("/api/v1/resumes/latest", get(handlers::handle_latest))
        .with_state(state)
}
