//! Local-network copy: the blob's bytes stream through this process and are
//! re-uploaded in blocks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use async_trait::async_trait;

use super::{ContainerPair, TransferBlob, TransferOutcome};
use crate::core::{BlobInfo, BlobStore, ProgressTracker};
use crate::error::{ReplicateError, Result};

/// Per-blob strategy that downloads the source stream and uploads it to the
/// destination as a committed block list, with a bounded number of in-flight
/// blocks.
pub struct LocalStreamCopy {
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    block_bytes: usize,
    concurrency: usize,
    timeout: Duration,
}

impl LocalStreamCopy {
    pub fn new(
        source: Arc<dyn BlobStore>,
        destination: Arc<dyn BlobStore>,
        block_bytes: usize,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            block_bytes: block_bytes.max(1),
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    async fn run(
        &self,
        containers: &ContainerPair,
        blob: &BlobInfo,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stream = self
            .source
            .open_read(&containers.source, &blob.name)
            .await?;

        let tracker = Arc::new(Mutex::new(ProgressTracker::new(blob.size)));
        let transferred = Arc::new(AtomicU64::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut uploads: JoinSet<Result<()>> = JoinSet::new();

        let mut block_ids: Vec<String> = Vec::new();
        let mut pending = BytesMut::with_capacity(self.block_bytes.min(1 << 20));

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReplicateError::Cancelled),
                chunk = stream.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };
            pending.extend_from_slice(&chunk?);

            while pending.len() >= self.block_bytes {
                let data = pending.split_to(self.block_bytes).freeze();
                self.spawn_block_upload(
                    &mut uploads,
                    &mut block_ids,
                    containers,
                    blob,
                    data,
                    semaphore.clone(),
                    tracker.clone(),
                    transferred.clone(),
                )
                .await?;
            }
        }

        if !pending.is_empty() {
            let data = pending.freeze();
            self.spawn_block_upload(
                &mut uploads,
                &mut block_ids,
                containers,
                blob,
                data,
                semaphore.clone(),
                tracker.clone(),
                transferred.clone(),
            )
            .await?;
        }

        while let Some(joined) = uploads.join_next().await {
            joined.map_err(|e| {
                ReplicateError::transfer(&blob.name, format!("upload task panicked: {}", e))
            })??;
        }

        self.destination
            .commit_block_list(&containers.destination, &blob.name, &block_ids)
            .await?;

        if let Some(percent) = tracker.lock().expect("tracker lock").finish() {
            info!(blob = %blob.name, "upload progress: {}%", percent);
        }
        debug!(blob = %blob.name, blocks = block_ids.len(), "blob committed");

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn_block_upload(
        &self,
        uploads: &mut JoinSet<Result<()>>,
        block_ids: &mut Vec<String>,
        containers: &ContainerPair,
        blob: &BlobInfo,
        data: Bytes,
        semaphore: Arc<Semaphore>,
        tracker: Arc<Mutex<ProgressTracker>>,
        transferred: Arc<AtomicU64>,
    ) -> Result<()> {
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("upload semaphore closed");

        let block_id = encode_block_id(block_ids.len() as u32);
        block_ids.push(block_id.clone());

        let destination = self.destination.clone();
        let container = containers.destination.clone();
        let blob_name = blob.name.clone();

        uploads.spawn(async move {
            let _permit = permit;
            let len = data.len() as u64;
            destination
                .put_block(&container, &blob_name, &block_id, data)
                .await?;

            let total = transferred.fetch_add(len, Ordering::SeqCst) + len;
            if let Some(percent) = tracker.lock().expect("tracker lock").update(total) {
                info!(blob = %blob_name, "upload progress: {}%", percent);
            }
            Ok(())
        });

        Ok(())
    }
}

#[async_trait]
impl TransferBlob for LocalStreamCopy {
    async fn transfer_blob(
        &self,
        containers: &ContainerPair,
        blob: &BlobInfo,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        // Unlike the server-side variant, a stalled stream has no copy state
        // to poll, so the whole upload runs under one deadline.
        match tokio::time::timeout(self.timeout, self.run(containers, blob, cancel)).await {
            Ok(result) => result.map(|()| TransferOutcome::Success),
            Err(_) => Err(ReplicateError::timeout(
                format!("streamed upload of {}", blob.name),
                self.timeout.as_secs(),
            )),
        }
    }
}

/// Block ids must be equal length before encoding; a fixed-width counter
/// keeps them unique and ordered.
fn encode_block_id(index: u32) -> String {
    BASE64.encode(format!("{:08}", index))
}
