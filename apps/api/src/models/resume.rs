use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Latest résumé for one authenticated user. One row per user; each publish
/// overwrites it, mirroring the storage slot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub user_id: String,
    pub latex_source: String,
    pub pdf_url: String,
    pub storage_path: String,
    pub provider: Option<String>,
    pub updated_at: DateTime<Utc>,
}
