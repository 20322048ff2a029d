//! Artifact publisher: moves a compiled PDF into per-owner storage.
//!
//! Keys are deterministic (`<owner prefix>/<slot file name>`), so publishing
//! again for the same owner overwrites the previous résumé instead of
//! versioning it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{ObjectStore, StorageError};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const MAX_UPLOAD_ATTEMPTS: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Slot every owner's résumé is published under.
pub const RESUME_FILE_NAME: &str = "resume.pdf";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to read compiled PDF: {0}")]
    Read(#[from] std::io::Error),

    #[error("Upload failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: StorageError },
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedArtifact {
    pub public_url: String,
    pub storage_path: String,
}

#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    file_name: String,
    base_delay: Duration,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            file_name: sanitize_file_name(RESUME_FILE_NAME),
            base_delay: BASE_RETRY_DELAY,
        }
    }

    /// Destination key for an owner folder such as `users/user123`.
    pub fn storage_path(&self, owner_prefix: &str) -> String {
        format!("{}/{}", owner_prefix.trim_end_matches('/'), self.file_name)
    }

    /// Uploads the PDF at `local_path`, retrying with exponential backoff
    /// (1s, 2s, ...) up to three attempts. The returned URL is the store's
    /// public URL, unmodified.
    pub async fn publish(
        &self,
        local_path: &Path,
        owner_prefix: &str,
    ) -> Result<PublishedArtifact, PublishError> {
        let bytes = tokio::fs::read(local_path).await?;
        let storage_path = self.storage_path(owner_prefix);

        let mut attempt = 1;
        loop {
            match self
                .store
                .upload(&storage_path, bytes.clone(), PDF_CONTENT_TYPE, true)
                .await
            {
                Ok(()) => break,
                Err(e) if attempt < MAX_UPLOAD_ATTEMPTS => {
                    let delay = self.base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "Upload attempt {attempt}/{MAX_UPLOAD_ATTEMPTS} for {storage_path} failed, retrying after {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(last) => {
                    return Err(PublishError::Exhausted {
                        attempts: attempt,
                        last,
                    })
                }
            }
        }

        info!("Published {} ({} bytes)", storage_path, bytes.len());
        Ok(PublishedArtifact {
            public_url: self.store.public_url(&storage_path),
            storage_path,
        })
    }

    /// Deletes every PDF under `owner_prefix` except the current slot.
    /// Returns the keys removed.
    pub async fn remove_stale(&self, owner_prefix: &str) -> Result<Vec<String>, StorageError> {
        let keep = self.storage_path(owner_prefix);
        let folder = format!("{}/", owner_prefix.trim_end_matches('/'));
        let stale: Vec<String> = self
            .store
            .list(&folder)
            .await?
            .into_iter()
            .filter(|key| key.to_ascii_lowercase().ends_with(".pdf") && *key != keep)
            .collect();
        self.store.remove(&stale).await?;
        Ok(stale)
    }
}

/// Lowercases, strips non-alphanumerics from the stem, and forces `.pdf`.
pub fn sanitize_file_name(name: &str) -> String {
    let stem = name
        .rsplit_once('.')
        .map_or(name, |(stem, _extension)| stem);
    let clean: String = stem
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let clean = if clean.is_empty() { "resume".to_string() } else { clean };
    format!("{clean}.pdf")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::storage::memory::MemoryStore;

    async fn pdf_on_disk(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("resume.pdf");
        tokio::fs::write(&path, b"%PDF-1.4 test").await.unwrap();
        path
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("resume.pdf"), "resume.pdf");
        assert_eq!(sanitize_file_name("My Résumé (v2).PDF"), "myrsumv2.pdf");
        assert_eq!(sanitize_file_name("cv.docx"), "cv.pdf");
        assert_eq!(sanitize_file_name("..."), "resume.pdf");
    }

    #[tokio::test]
    async fn test_publish_twice_overwrites_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = pdf_on_disk(dir.path()).await;
        let store = Arc::new(MemoryStore::default());
        let publisher = ArtifactPublisher::new(store.clone());

        let first = publisher.publish(&local, "users/user123").await.unwrap();
        tokio::fs::write(&local, b"%PDF-1.4 second").await.unwrap();
        let second = publisher.publish(&local, "users/user123").await.unwrap();

        assert_eq!(first.storage_path, "users/user123/resume.pdf");
        assert_eq!(second.storage_path, first.storage_path);
        assert_eq!(second.public_url, "https://storage.test/resumes/users/user123/resume.pdf");
        assert_eq!(store.keys(), vec!["users/user123/resume.pdf".to_string()]);
        assert_eq!(
            store.objects.lock().unwrap()["users/user123/resume.pdf"],
            b"%PDF-1.4 second".to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_retries_with_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let local = pdf_on_disk(dir.path()).await;
        let store = Arc::new(MemoryStore::failing(2));
        let publisher = ArtifactPublisher::new(store.clone());

        let started = tokio::time::Instant::now();
        let artifact = publisher.publish(&local, "users/u1").await.unwrap();

        assert_eq!(artifact.storage_path, "users/u1/resume.pdf");
        assert_eq!(store.upload_attempts.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_gives_up_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let local = pdf_on_disk(dir.path()).await;
        let store = Arc::new(MemoryStore::failing(5));
        let publisher = ArtifactPublisher::new(store.clone());

        let err = publisher.publish(&local, "users/u1").await.unwrap_err();

        assert_eq!(store.upload_attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(err, PublishError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("injected failure 3"));
    }

    #[tokio::test]
    async fn test_publish_missing_file_fails_without_upload() {
        let store = Arc::new(MemoryStore::default());
        let publisher = ArtifactPublisher::new(store.clone());
        let err = publisher
            .publish(Path::new("/nonexistent/resume.pdf"), "users/u1")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Read(_)));
        assert_eq!(store.upload_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remove_stale_keeps_current_slot() {
        let store = Arc::new(MemoryStore::default());
        for key in [
            "users/u1/resume.pdf",
            "users/u1/resume-1699999999.pdf",
            "users/u1/notes.txt",
            "users/u10/resume-old.pdf",
        ] {
            store.upload(key, vec![1], PDF_CONTENT_TYPE, true).await.unwrap();
        }
        let publisher = ArtifactPublisher::new(store.clone());

        let removed = publisher.remove_stale("users/u1").await.unwrap();

        assert_eq!(removed, vec!["users/u1/resume-1699999999.pdf".to_string()]);
        assert_eq!(
            store.keys(),
            vec![
                "users/u1/notes.txt".to_string(),
                "users/u1/resume.pdf".to_string(),
                "users/u10/resume-old.pdf".to_string(),
            ]
        );
    }
}
