//! Background removal of stale PDFs.
//!
//! Cleanup is off the request path: handlers enqueue an owner folder and move
//! on. A single worker drains the queue; failures go out on a dedicated
//! channel rather than being dropped.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::storage::publisher::ArtifactPublisher;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct CleanupFailure {
    pub owner_prefix: String,
    pub error: StorageError,
}

/// Handle for scheduling cleanups. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    sender: mpsc::UnboundedSender<String>,
}

/// Everything `CleanupQueue::spawn` starts.
#[derive(Debug)]
pub struct CleanupWorker {
    pub queue: CleanupQueue,
    /// Closes once the worker has stopped.
    pub failures: mpsc::UnboundedReceiver<CleanupFailure>,
}

impl CleanupQueue {
    /// Starts the worker. It stops once every `CleanupQueue` clone is dropped.
    pub fn spawn(publisher: ArtifactPublisher) -> CleanupWorker {
        let (sender, mut requests) = mpsc::unbounded_channel::<String>();
        let (failure_tx, failures) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(owner_prefix) = requests.recv().await {
                match publisher.remove_stale(&owner_prefix).await {
                    Ok(removed) if !removed.is_empty() => {
                        debug!("Removed {} stale PDFs under {owner_prefix}", removed.len());
                    }
                    Ok(_) => {}
                    Err(error) => {
                        // Nobody listening is not a reason to stop cleaning.
                        let _ = failure_tx.send(CleanupFailure {
                            owner_prefix,
                            error,
                        });
                    }
                }
            }
        });

        CleanupWorker {
            queue: CleanupQueue { sender },
            failures,
        }
    }

    pub fn enqueue(&self, owner_prefix: impl Into<String>) {
        let owner_prefix = owner_prefix.into();
        if self.sender.send(owner_prefix).is_err() {
            warn!("Cleanup worker has stopped; skipping stale PDF cleanup");
        }
    }
}

/// Drains the failure channel into the log until the worker stops.
pub async fn log_failures(mut failures: mpsc::UnboundedReceiver<CleanupFailure>) {
    while let Some(failure) = failures.recv().await {
        warn!(
            "Stale PDF cleanup for {} failed: {}",
            failure.owner_prefix, failure.error
        );
    }
}
