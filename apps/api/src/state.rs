use std::sync::Arc;

use sqlx::PgPool;

use crate::resume::pipeline::ResumePipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Upload and recompile flows. Stateless apart from the stores it holds.
    pub pipeline: Arc<ResumePipeline>,
}
