use sqlx::PgPool;

use crate::models::resume::ResumeRow;

pub struct ResumeRecord<'a> {
    pub user_id: &'a str,
    pub latex_source: &'a str,
    pub pdf_url: &'a str,
    pub storage_path: &'a str,
    pub provider: Option<&'a str>,
}

/// Inserts or replaces the user's résumé row.
pub async fn upsert_resume(pool: &PgPool, record: ResumeRecord<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO resumes (user_id, latex_source, pdf_url, storage_path, provider, updated_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (user_id) DO UPDATE SET
            latex_source = EXCLUDED.latex_source,
            pdf_url      = EXCLUDED.pdf_url,
            storage_path = EXCLUDED.storage_path,
            provider     = EXCLUDED.provider,
            updated_at   = EXCLUDED.updated_at
        "#,
    )
    .bind(record.user_id)
    .bind(record.latex_source)
    .bind(record.pdf_url)
    .bind(record.storage_path)
    .bind(record.provider)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_resume(pool: &PgPool, user_id: &str) -> Result<Option<ResumeRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}
