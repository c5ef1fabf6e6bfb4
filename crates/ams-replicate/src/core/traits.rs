//! Core traits for account-agnostic replication.
//!
//! This module defines the primary abstractions used by the replication
//! engine:
//!
//! - [`ResourceOperations`]: the {List, Get, Create} capability of one
//!   management-API resource kind. The generic metadata mirror is written
//!   against this trait and instantiated once per kind.
//! - [`BlobStore`]: the object-storage surface one account exposes
//!   (listing, copy state, SAS minting, streaming read, block upload).
//!
//! Concrete implementations live in the `arm` and `storage` driver modules;
//! tests substitute small in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

use super::paging::{Page, Pager};
use crate::error::Result;

/// A resource addressed by a name unique within its kind.
pub trait NamedResource {
    /// The identity key used for get-or-create decisions.
    fn name(&self) -> &str;
}

/// The {List, Get, Create} capability of one resource kind on one account.
///
/// Creation is idempotent by contract: callers only invoke [`create`] after
/// [`get`] (or a listing) shows the name absent, and implementations never
/// update an existing resource in place.
///
/// [`create`]: ResourceOperations::create
/// [`get`]: ResourceOperations::get
#[async_trait]
pub trait ResourceOperations: Send + Sync {
    /// Wire model for this kind.
    type Resource: NamedResource + Send + Sync;

    /// Human-readable kind label for logs and reports.
    fn kind(&self) -> &'static str;

    /// Fetch one listing page; `cursor` is `None` for the first page.
    async fn list_page(&self, cursor: Option<&str>) -> Result<Page<Self::Resource>>;

    /// Fetch a resource by name, or `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Self::Resource>>;

    /// Create a resource under the given name and return the stored record.
    async fn create(&self, name: &str, resource: &Self::Resource) -> Result<Self::Resource>;
}

/// Lazily enumerate every resource of a kind.
pub fn resource_pager<O: ResourceOperations>(ops: &O) -> Pager<'_, O::Resource> {
    Pager::new(Box::new(move |cursor| {
        Box::pin(async move { ops.list_page(cursor.as_deref()).await })
    }))
}

/// A blob within a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Name, unique within the container; the identity key for diffing.
    pub name: String,

    /// Size in bytes.
    pub size: u64,
}

/// Terminal and non-terminal states of a server-side copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Pending,
    Success,
    Failed,
    Aborted,
}

impl CopyStatus {
    /// Parse the storage API's copy-status header value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CopyStatus::Pending),
            "success" => Some(CopyStatus::Success),
            "failed" => Some(CopyStatus::Failed),
            "aborted" => Some(CopyStatus::Aborted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Failed => "failed",
            CopyStatus::Aborted => "aborted",
        }
    }
}

/// Copy state of a destination blob, as read from its properties.
#[derive(Debug, Clone)]
pub struct CopyState {
    pub status: CopyStatus,

    /// Service-provided description of a terminal failure.
    pub description: Option<String>,

    /// Bytes copied so far, when the service reports progress.
    pub bytes_copied: Option<u64>,

    /// Total bytes of the copy, when the service reports progress.
    pub bytes_total: Option<u64>,
}

/// Permission set for a SAS credential.
///
/// Rendered in the service's canonical permission order regardless of how
/// the set was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    /// Source-side scope: read + list.
    pub fn read_list() -> Self {
        Self {
            read: true,
            list: true,
            ..Self::default()
        }
    }

    /// Destination-side scope: read + list + write (create rides along so
    /// new blobs can be written).
    pub fn read_write_list() -> Self {
        Self {
            read: true,
            create: true,
            write: true,
            list: true,
            ..Self::default()
        }
    }

    /// Write-only scope for uploading a single new blob.
    pub fn create_write() -> Self {
        Self {
            create: true,
            write: true,
            ..Self::default()
        }
    }

    /// Render in canonical `racwdl` order.
    pub fn to_permission_string(&self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.add {
            s.push('a');
        }
        if self.create {
            s.push('c');
        }
        if self.write {
            s.push('w');
        }
        if self.delete {
            s.push('d');
        }
        if self.list {
            s.push('l');
        }
        s
    }
}

/// Object-storage surface of one account.
///
/// `open_read` follows the streaming idiom used throughout the engine: the
/// implementation spawns a pump task and hands back a channel receiver,
/// giving the consumer backpressure for free.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Storage account name (used in logs and external tool URLs).
    fn account_name(&self) -> &str;

    /// Fetch one page of a container's blob listing.
    async fn list_blobs_page(&self, container: &str, marker: Option<&str>)
        -> Result<Page<BlobInfo>>;

    /// Mint a SAS URL for a single blob.
    fn blob_sas_url(
        &self,
        container: &str,
        blob: &str,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> Result<String>;

    /// Mint a SAS URL for a whole container.
    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> Result<String>;

    /// Ask the service to copy `source_url` into the given blob.
    async fn begin_copy_from_url(&self, container: &str, blob: &str, source_url: &str)
        -> Result<()>;

    /// Read the blob's current copy state from its properties.
    async fn copy_state(&self, container: &str, blob: &str) -> Result<CopyState>;

    /// Open a streaming read over the blob's content.
    async fn open_read(&self, container: &str, blob: &str) -> Result<mpsc::Receiver<Result<Bytes>>>;

    /// Upload one block of a blob.
    async fn put_block(&self, container: &str, blob: &str, block_id: &str, data: Bytes)
        -> Result<()>;

    /// Commit previously uploaded blocks as the blob's content.
    async fn commit_block_list(&self, container: &str, blob: &str, block_ids: &[String])
        -> Result<()>;
}

/// Lazily enumerate a container's blobs.
pub fn blob_pager<'a>(store: &'a dyn BlobStore, container: &'a str) -> Pager<'a, BlobInfo> {
    Pager::new(Box::new(move |marker| {
        Box::pin(async move { store.list_blobs_page(container, marker.as_deref()).await })
    }))
}

/// Drain a container's full blob listing.
pub async fn list_all_blobs(store: &dyn BlobStore, container: &str) -> Result<Vec<BlobInfo>> {
    blob_pager(store, container).collect().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_string_canonical_order() {
        let perms = SasPermissions {
            list: true,
            write: true,
            read: true,
            create: true,
            ..SasPermissions::default()
        };
        assert_eq!(perms.to_permission_string(), "rcwl");
    }

    #[test]
    fn test_scope_presets() {
        assert_eq!(SasPermissions::read_list().to_permission_string(), "rl");
        assert_eq!(
            SasPermissions::read_write_list().to_permission_string(),
            "rcwl"
        );
        assert_eq!(SasPermissions::create_write().to_permission_string(), "cw");
    }

    #[test]
    fn test_copy_status_parse_round_trip() {
        for status in [
            CopyStatus::Pending,
            CopyStatus::Success,
            CopyStatus::Failed,
            CopyStatus::Aborted,
        ] {
            assert_eq!(CopyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CopyStatus::parse("unknown"), None);
    }
}
