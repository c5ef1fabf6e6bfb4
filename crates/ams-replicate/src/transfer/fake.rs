//! In-memory [`BlobStore`] used by strategy and orchestrator tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::{BlobInfo, BlobStore, CopyState, CopyStatus, Page, SasPermissions};
use crate::error::{ReplicateError, Result};

type BlobKey = (String, String);

#[derive(Default)]
pub(crate) struct FakeBlobStore {
    name: String,
    /// Container listings, in insertion order.
    pub blobs: Mutex<HashMap<String, Vec<BlobInfo>>>,
    /// Blob content served by `open_read`, keyed by (container, blob).
    pub content: Mutex<HashMap<BlobKey, Bytes>>,
    /// Scripted copy-state sequences per (container, blob); the last entry
    /// repeats once the queue drains.
    pub copy_states: Mutex<HashMap<BlobKey, VecDeque<CopyState>>>,
    /// Recorded begin_copy_from_url calls: (container, blob, source_url).
    pub copy_requests: Mutex<Vec<(String, String, String)>>,
    /// Recorded put_block calls.
    pub blocks: Mutex<HashMap<BlobKey, Vec<(String, Bytes)>>>,
    /// Recorded commit_block_list calls.
    pub commits: Mutex<HashMap<BlobKey, Vec<String>>>,
    /// Blob listing page size (0 = everything in one page).
    pub page_size: usize,
}

impl FakeBlobStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_blobs(name: &str, container: &str, blobs: &[(&str, u64)]) -> Self {
        let store = Self::new(name);
        store.add_blobs(container, blobs);
        store
    }

    pub fn add_blobs(&self, container: &str, blobs: &[(&str, u64)]) {
        let mut listing = self.blobs.lock().unwrap();
        let entry = listing.entry(container.to_string()).or_default();
        for (name, size) in blobs {
            entry.push(BlobInfo {
                name: name.to_string(),
                size: *size,
            });
        }
    }

    pub fn set_content(&self, container: &str, blob: &str, content: &[u8]) {
        self.content.lock().unwrap().insert(
            (container.to_string(), blob.to_string()),
            Bytes::copy_from_slice(content),
        );
    }

    pub fn script_copy_states(&self, container: &str, blob: &str, states: Vec<CopyState>) {
        self.copy_states
            .lock()
            .unwrap()
            .insert((container.to_string(), blob.to_string()), states.into());
    }

    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap()
            .get(container)
            .map(|blobs| blobs.iter().map(|b| b.name.clone()).collect())
            .unwrap_or_default()
    }
}

pub(crate) fn copy_state(status: CopyStatus, copied: u64, total: u64) -> CopyState {
    CopyState {
        status,
        description: None,
        bytes_copied: Some(copied),
        bytes_total: Some(total),
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    fn account_name(&self) -> &str {
        &self.name
    }

    async fn list_blobs_page(
        &self,
        container: &str,
        marker: Option<&str>,
    ) -> Result<Page<BlobInfo>> {
        let listing = self.blobs.lock().unwrap();
        let all = listing.get(container).cloned().unwrap_or_default();

        if self.page_size == 0 {
            return Ok(Page::last(all));
        }

        let offset: usize = marker.map(|m| m.parse().unwrap_or(0)).unwrap_or(0);
        let items: Vec<_> = all.iter().skip(offset).take(self.page_size).cloned().collect();
        let next_offset = offset + items.len();
        let next = (next_offset < all.len()).then(|| next_offset.to_string());
        Ok(Page { items, next })
    }

    fn blob_sas_url(
        &self,
        container: &str,
        blob: &str,
        permissions: SasPermissions,
        _expires_in: Duration,
    ) -> Result<String> {
        Ok(format!(
            "https://{}.blob.fake/{}/{}?sp={}&sig=fake",
            self.name,
            container,
            blob,
            permissions.to_permission_string()
        ))
    }

    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        _expires_in: Duration,
    ) -> Result<String> {
        Ok(format!(
            "https://{}.blob.fake/{}?sp={}&sig=fake",
            self.name,
            container,
            permissions.to_permission_string()
        ))
    }

    async fn begin_copy_from_url(
        &self,
        container: &str,
        blob: &str,
        source_url: &str,
    ) -> Result<()> {
        self.copy_requests.lock().unwrap().push((
            container.to_string(),
            blob.to_string(),
            source_url.to_string(),
        ));
        Ok(())
    }

    async fn copy_state(&self, container: &str, blob: &str) -> Result<CopyState> {
        let key = (container.to_string(), blob.to_string());
        let mut scripts = self.copy_states.lock().unwrap();
        let queue = scripts.get_mut(&key).ok_or_else(|| {
            ReplicateError::storage("GetBlobProperties", 404, format!("no copy state for {}", blob))
        })?;

        let state = if queue.len() > 1 {
            queue.pop_front().expect("non-empty queue")
        } else {
            queue.front().cloned().ok_or_else(|| {
                ReplicateError::storage("GetBlobProperties", 404, "copy state queue empty")
            })?
        };

        // A terminal success makes the blob visible in the listing, like a
        // completed service-side copy would.
        if state.status == CopyStatus::Success {
            let mut listing = self.blobs.lock().unwrap();
            let entry = listing.entry(container.to_string()).or_default();
            if !entry.iter().any(|b| b.name == blob) {
                entry.push(BlobInfo {
                    name: blob.to_string(),
                    size: state.bytes_total.unwrap_or(0),
                });
            }
        }

        Ok(state)
    }

    async fn open_read(
        &self,
        container: &str,
        blob: &str,
    ) -> Result<mpsc::Receiver<Result<Bytes>>> {
        let key = (container.to_string(), blob.to_string());
        let content = self
            .content
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ReplicateError::storage("GetBlob", 404, format!("no blob {}", blob)))?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            // Serve in small chunks so block assembly sees a real stream.
            for chunk in content.chunks(3) {
                if tx.send(Ok(Bytes::copy_from_slice(chunk))).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn put_block(
        &self,
        container: &str,
        blob: &str,
        block_id: &str,
        data: Bytes,
    ) -> Result<()> {
        let key = (container.to_string(), blob.to_string());
        self.blocks
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push((block_id.to_string(), data));
        Ok(())
    }

    async fn commit_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
    ) -> Result<()> {
        let key = (container.to_string(), blob.to_string());

        let size = {
            let blocks = self.blocks.lock().unwrap();
            let uploaded = blocks.get(&key).cloned().unwrap_or_default();
            block_ids
                .iter()
                .filter_map(|id| {
                    uploaded
                        .iter()
                        .find(|(uploaded_id, _)| uploaded_id == id)
                        .map(|(_, data)| data.len() as u64)
                })
                .sum()
        };

        self.commits
            .lock()
            .unwrap()
            .insert(key, block_ids.to_vec());

        let mut listing = self.blobs.lock().unwrap();
        let entry = listing.entry(container.to_string()).or_default();
        if !entry.iter().any(|b| b.name == blob) {
            entry.push(BlobInfo {
                name: blob.to_string(),
                size,
            });
        }
        Ok(())
    }
}
