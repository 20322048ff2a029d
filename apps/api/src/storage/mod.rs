//! Durable storage for compiled résumés.
//!
//! `ObjectStore` is the seam over the object-storage service; the bucket is
//! bound when the store is built. `S3ObjectStore` is the production backend
//! (AWS S3 or any S3-compatible endpoint such as MinIO).

pub mod cleanup;
pub mod publisher;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use thiserror::Error;

pub use cleanup::CleanupQueue;
pub use publisher::{ArtifactPublisher, PublishError, PublishedArtifact};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },

    #[error("object '{key}' already exists")]
    AlreadyExists { key: String },

    #[error("listing '{prefix}' failed: {message}")]
    List { prefix: String, message: String },

    #[error("delete failed: {0}")]
    Remove(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`. With `overwrite == false` an existing
    /// object is an error.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;

    /// Keys of every object under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control("no-cache");
        if !overwrite {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            let message = aws_sdk_s3::error::DisplayErrorContext(&e).to_string();
            if !overwrite && message.contains("PreconditionFailed") {
                StorageError::AlreadyExists {
                    key: key.to_string(),
                }
            } else {
                StorageError::Upload {
                    key: key.to_string(),
                    message,
                }
            }
        })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::List {
                    prefix: prefix.to_string(),
                    message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
                })?;

            keys.extend(page.contents().iter().filter_map(|o| o.key().map(String::from)));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Remove(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::Remove(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::Remove(aws_sdk_s3::error::DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory `ObjectStore` used by tests across the crate.

    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
        /// Number of upcoming uploads that fail before uploads succeed.
        pub failing_uploads: AtomicUsize,
        pub upload_attempts: AtomicUsize,
        pub fail_list: bool,
    }

    impl MemoryStore {
        pub fn failing(times: usize) -> Self {
            Self {
                failing_uploads: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload(
            &self,
            key: &str,
            bytes: Vec<u8>,
            _content_type: &str,
            overwrite: bool,
        ) -> Result<(), StorageError> {
            self.upload_attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failing_uploads.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_uploads.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Upload {
                    key: key.to_string(),
                    message: format!("injected failure {remaining}"),
                });
            }
            let mut objects = self.objects.lock().unwrap();
            if !overwrite && objects.contains_key(key) {
                return Err(StorageError::AlreadyExists {
                    key: key.to_string(),
                });
            }
            objects.insert(key.to_string(), bytes);
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://storage.test/resumes/{key}")
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            if self.fail_list {
                return Err(StorageError::List {
                    prefix: prefix.to_string(),
                    message: "injected list failure".to_string(),
                });
            }
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
            let mut objects = self.objects.lock().unwrap();
            for key in keys {
                objects.remove(key);
            }
            Ok(())
        }
    }
}
