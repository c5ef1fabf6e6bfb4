//! Core primitives shared by the drivers and the replication engine.

pub mod diff;
pub mod paging;
pub mod progress;
pub mod traits;

pub use diff::{diff_containers, ContainerDiff};
pub use paging::{Page, Pager};
pub use progress::ProgressTracker;
pub use traits::{
    blob_pager, list_all_blobs, resource_pager, BlobInfo, BlobStore, CopyState, CopyStatus,
    NamedResource, ResourceOperations, SasPermissions,
};
