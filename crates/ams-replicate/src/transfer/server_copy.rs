//! Server-side copy: the destination service pulls the blob from a source
//! SAS URL while this process polls the copy state.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use async_trait::async_trait;

use super::{ContainerPair, TransferBlob, TransferOutcome};
use crate::core::{BlobInfo, BlobStore, CopyStatus, ProgressTracker, SasPermissions};
use crate::error::{ReplicateError, Result};

/// Per-blob strategy that delegates the byte movement to the storage
/// service and waits for the copy to leave the pending state.
pub struct ServerSideCopy {
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    poll_interval: Duration,
    timeout: Duration,
    sas_expiry: Duration,
}

impl ServerSideCopy {
    pub fn new(
        source: Arc<dyn BlobStore>,
        destination: Arc<dyn BlobStore>,
        poll_interval: Duration,
        timeout: Duration,
        sas_expiry: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            poll_interval,
            timeout,
            sas_expiry,
        }
    }
}

#[async_trait]
impl TransferBlob for ServerSideCopy {
    async fn transfer_blob(
        &self,
        containers: &ContainerPair,
        blob: &BlobInfo,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let source_url = self.source.blob_sas_url(
            &containers.source,
            &blob.name,
            SasPermissions::read_list(),
            self.sas_expiry,
        )?;

        self.destination
            .begin_copy_from_url(&containers.destination, &blob.name, &source_url)
            .await?;

        let mut tracker = ProgressTracker::new(blob.size);
        let deadline = Instant::now() + self.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(ReplicateError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ReplicateError::timeout(
                    format!("server-side copy of {}", blob.name),
                    self.timeout.as_secs(),
                ));
            }

            let state = self
                .destination
                .copy_state(&containers.destination, &blob.name)
                .await?;

            match state.status {
                CopyStatus::Success => {
                    if let Some(percent) = tracker.finish() {
                        info!(blob = %blob.name, "copy progress: {}%", percent);
                    }
                    return Ok(TransferOutcome::Success);
                }
                CopyStatus::Pending => {
                    if let Some(copied) = state.bytes_copied {
                        if let Some(percent) = tracker.update(copied) {
                            info!(blob = %blob.name, "copy progress: {}%", percent);
                        }
                    }
                }
                CopyStatus::Failed => {
                    warn!(blob = %blob.name, "copy stopped: {}", state.description.as_deref().unwrap_or("no description"));
                    return Ok(TransferOutcome::Failed {
                        description: state.description,
                    });
                }
                CopyStatus::Aborted => {
                    warn!(blob = %blob.name, "copy stopped: {}", state.description.as_deref().unwrap_or("no description"));
                    return Ok(TransferOutcome::Aborted {
                        description: state.description,
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ReplicateError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
