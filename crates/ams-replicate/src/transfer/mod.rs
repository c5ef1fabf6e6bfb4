//! Transfer strategies: how blob content moves between the two accounts.
//!
//! Three variants, selected once per run by configuration:
//!
//! - [`ServerSideCopy`] (per blob): the destination service pulls from a
//!   SAS URL; this process only polls for completion.
//! - [`LocalStreamCopy`] (per blob): bytes stream through this process in
//!   blocks.
//! - [`BulkCopy`] (per container): a delegated external executable moves the
//!   whole container, including its own diffing.

pub mod bulk_copy;
pub mod local_stream;
pub mod server_copy;

#[cfg(test)]
pub(crate) mod fake;

pub use bulk_copy::BulkCopy;
pub use local_stream::LocalStreamCopy;
pub use server_copy::ServerSideCopy;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{TransferMode, TransferSettings};
use crate::core::{BlobInfo, BlobStore};
use crate::error::Result;

/// The pair of containers one asset maps to.
#[derive(Debug, Clone)]
pub struct ContainerPair {
    pub source: String,
    pub destination: String,
}

/// Terminal state of one blob transfer job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failed { description: Option<String> },
    Aborted { description: Option<String> },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }

    /// Status label plus the service's description, for logging.
    pub fn describe(&self) -> String {
        match self {
            TransferOutcome::Success => "success".to_string(),
            TransferOutcome::Failed { description } => {
                format!("failed: {}", description.as_deref().unwrap_or("no description"))
            }
            TransferOutcome::Aborted { description } => {
                format!("aborted: {}", description.as_deref().unwrap_or("no description"))
            }
        }
    }
}

/// Per-blob transfer capability.
#[async_trait]
pub trait TransferBlob: Send + Sync {
    /// Move one blob; a terminal Failed/Aborted state is an outcome, not an
    /// error, so the container pass can continue.
    async fn transfer_blob(
        &self,
        containers: &ContainerPair,
        blob: &BlobInfo,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome>;
}

/// Whole-container transfer capability.
#[async_trait]
pub trait TransferContainer: Send + Sync {
    async fn transfer_container(
        &self,
        containers: &ContainerPair,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// The per-blob variants, dispatched statically.
pub enum BlobTransfer {
    ServerSide(ServerSideCopy),
    LocalStream(LocalStreamCopy),
}

#[async_trait]
impl TransferBlob for BlobTransfer {
    async fn transfer_blob(
        &self,
        containers: &ContainerPair,
        blob: &BlobInfo,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        match self {
            BlobTransfer::ServerSide(strategy) => {
                strategy.transfer_blob(containers, blob, cancel).await
            }
            BlobTransfer::LocalStream(strategy) => {
                strategy.transfer_blob(containers, blob, cancel).await
            }
        }
    }
}

/// The strategy a run operates with, at its natural granularity. The
/// per-blob variant is shared across concurrent transfer tasks.
pub enum Strategy {
    PerBlob(Arc<BlobTransfer>),
    WholeContainer(BulkCopy),
}

/// Build the configured strategy over the two accounts' stores.
pub fn build_strategy(
    settings: &TransferSettings,
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
) -> Result<Strategy> {
    let sas_expiry = Duration::from_secs(settings.sas_expiry_hours * 60 * 60);
    let timeout = Duration::from_secs(settings.copy_timeout_secs);

    let strategy = match settings.mode {
        TransferMode::ServerSideCopy => Strategy::PerBlob(Arc::new(BlobTransfer::ServerSide(
            ServerSideCopy::new(
                source,
                destination,
                Duration::from_millis(settings.poll_interval_ms),
                timeout,
                sas_expiry,
            ),
        ))),
        TransferMode::LocalNetwork => Strategy::PerBlob(Arc::new(BlobTransfer::LocalStream(
            LocalStreamCopy::new(
                source,
                destination,
                settings.upload_block_bytes,
                settings.get_upload_concurrency(),
                timeout,
            ),
        ))),
        TransferMode::ExternalBulkCopy => {
            let executable = settings.azcopy_path.clone().ok_or_else(|| {
                crate::error::ReplicateError::Config(
                    "transfer.azcopy_path is required for external-bulk-copy mode".into(),
                )
            })?;
            Strategy::WholeContainer(BulkCopy::new(
                source,
                destination,
                executable,
                settings.preserve_access_tier,
                sas_expiry,
                timeout,
            ))
        }
    };

    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_describe() {
        assert_eq!(TransferOutcome::Success.describe(), "success");
        assert_eq!(
            TransferOutcome::Failed {
                description: Some("503".into())
            }
            .describe(),
            "failed: 503"
        );
        assert_eq!(
            TransferOutcome::Aborted { description: None }.describe(),
            "aborted: no description"
        );
    }

    #[test]
    fn test_build_strategy_matches_mode() {
        let source: Arc<dyn BlobStore> = Arc::new(fake::FakeBlobStore::new("src"));
        let destination: Arc<dyn BlobStore> = Arc::new(fake::FakeBlobStore::new("dst"));

        let settings = TransferSettings::default();
        match build_strategy(&settings, source.clone(), destination.clone()).unwrap() {
            Strategy::PerBlob(strategy) => {
                assert!(matches!(strategy.as_ref(), BlobTransfer::ServerSide(_)));
            }
            Strategy::WholeContainer(_) => panic!("expected per-blob strategy"),
        }

        let settings = TransferSettings {
            mode: TransferMode::LocalNetwork,
            ..TransferSettings::default()
        };
        match build_strategy(&settings, source.clone(), destination.clone()).unwrap() {
            Strategy::PerBlob(strategy) => {
                assert!(matches!(strategy.as_ref(), BlobTransfer::LocalStream(_)));
            }
            Strategy::WholeContainer(_) => panic!("expected per-blob strategy"),
        }

        let settings = TransferSettings {
            mode: TransferMode::ExternalBulkCopy,
            azcopy_path: Some("/bin/azcopy".into()),
            ..TransferSettings::default()
        };
        assert!(matches!(
            build_strategy(&settings, source.clone(), destination.clone()).unwrap(),
            Strategy::WholeContainer(_)
        ));

        // Missing executable path is a configuration error.
        let settings = TransferSettings {
            mode: TransferMode::ExternalBulkCopy,
            ..TransferSettings::default()
        };
        assert!(build_strategy(&settings, source, destination).is_err());
    }
}
