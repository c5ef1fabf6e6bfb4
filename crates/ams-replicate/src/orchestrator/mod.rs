//! Replication orchestrator - main workflow coordinator.
//!
//! Drives the fixed pipeline over the seven resource kinds (account filters,
//! content-key policies, transforms, streaming endpoints, assets, streaming
//! locators, live events + outputs), accumulating a [`ReplicationReport`]
//! instead of aborting on per-item failures. Re-running a finished or
//! interrupted run is safe: every create is get-or-create and the blob pass
//! re-diffs the containers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::arm::models::Asset;
use crate::arm::ArmClient;
use crate::config::{AccountConfig, Config};
use crate::core::{
    diff_containers, list_all_blobs, resource_pager, BlobStore, ResourceOperations,
};
use crate::error::{ReplicateError, Result};
use crate::mirror::{kinds, mirror_resources, ItemFailure, MirrorOptions, MirrorOutcome};
use crate::storage::StorageAccount;
use crate::transfer::{
    build_strategy, BlobTransfer, ContainerPair, Strategy, TransferBlob, TransferContainer,
    TransferOutcome,
};

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Result of a replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// Whether this was a dry run (nothing created, nothing copied).
    pub dry_run: bool,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-kind mirror counts, in pipeline order.
    pub kinds: Vec<MirrorOutcome>,

    /// Asset and blob totals.
    pub assets: AssetTotals,

    /// Per-asset blob counts, in listing order (per-blob strategies only;
    /// bulk copy delegates the counting to the external tool).
    pub asset_details: Vec<AssetBlobCounts>,

    /// Failures outside the per-kind outcomes (assets, blobs, whole steps).
    pub failures: Vec<ItemFailure>,
}

/// Blob counts for one asset's container pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBlobCounts {
    pub asset: String,
    pub copied: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Totals for the asset replication step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetTotals {
    /// Source assets seen.
    pub assets_total: usize,

    /// Assets fully replicated (blobs and filters included).
    pub assets_replicated: usize,

    /// Blobs copied (or, in a dry run, that would be copied).
    pub blobs_copied: usize,

    /// Blobs skipped because the destination already had them.
    pub blobs_already_present: usize,

    /// Blobs whose transfer ended in a terminal failure.
    pub blobs_failed: usize,
}

impl ReplicationReport {
    fn new(run_id: String, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            dry_run,
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            kinds: Vec::new(),
            assets: AssetTotals::default(),
            asset_details: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Total failed items across kinds, assets and blobs.
    pub fn failure_count(&self) -> usize {
        self.kinds.iter().map(|k| k.failed.len()).sum::<usize>() + self.failures.len()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity check result for both accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub source_connected: bool,
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_error: Option<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.source_connected && self.destination_connected
    }
}

/// Management and storage handles for one account.
struct AccountHandles {
    arm: ArmClient,
    store: Arc<dyn BlobStore>,
    location: String,
}

impl AccountHandles {
    fn new(config: &AccountConfig) -> Result<Self> {
        Ok(Self {
            arm: ArmClient::new(config)?,
            store: Arc::new(StorageAccount::new(config)?),
            location: config.location.clone(),
        })
    }
}

/// Replication orchestrator.
pub struct Orchestrator {
    config: Config,
    source: AccountHandles,
    destination: AccountHandles,
}

impl Orchestrator {
    /// Create a new orchestrator from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        let source = AccountHandles::new(&config.source)?;
        let destination = AccountHandles::new(&config.destination)?;
        Ok(Self {
            config,
            source,
            destination,
        })
    }

    /// Verify both accounts are reachable with the configured credentials.
    pub async fn health_check(&self) -> Result<HealthReport> {
        let source = self.source.arm.check_access().await;
        let destination = self.destination.arm.check_access().await;

        Ok(HealthReport {
            source_connected: source.is_ok(),
            source_error: source.err().map(|e| e.to_string()),
            destination_connected: destination.is_ok(),
            destination_error: destination.err().map(|e| e.to_string()),
        })
    }

    /// Run the replication pipeline.
    pub async fn run(&self, cancel: CancellationToken, dry_run: bool) -> Result<ReplicationReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting replication run: {}", run_id);
        self.log_account_banner();

        let strategy = build_strategy(
            &self.config.transfer,
            self.source.store.clone(),
            self.destination.store.clone(),
        )?;

        let mut report = ReplicationReport::new(run_id, dry_run, started_at);
        let options = MirrorOptions {
            dry_run,
            case_insensitive_names: false,
        };

        let mut cancelled = cancel.is_cancelled();

        if !cancelled {
            info!("Step 1 of 7: Replicate account filters");
            let result = mirror_resources(
                &self.source.arm.account_filters(),
                &self.destination.arm.account_filters(),
                kinds::prepare_verbatim,
                &options,
                &cancel,
            )
            .await;
            cancelled = record_kind_step(&mut report, "account filter", result) || cancel.is_cancelled();
        }

        if !cancelled {
            info!("Step 2 of 7: Replicate content key policies");
            let result = mirror_resources(
                &self.source.arm.content_key_policies_with_secrets(),
                &self.destination.arm.content_key_policies(),
                |policy| Ok(kinds::prepare_content_key_policy(policy)),
                &options,
                &cancel,
            )
            .await;
            cancelled =
                record_kind_step(&mut report, "content key policy", result) || cancel.is_cancelled();
        }

        if !cancelled {
            info!("Step 3 of 7: Replicate transforms");
            let result = mirror_resources(
                &self.source.arm.transforms(),
                &self.destination.arm.transforms(),
                |transform| Ok(kinds::prepare_transform(transform)),
                &options,
                &cancel,
            )
            .await;
            cancelled = record_kind_step(&mut report, "transform", result) || cancel.is_cancelled();
        }

        if !cancelled {
            info!("Step 4 of 7: Replicate streaming endpoints");
            // The service treats streaming endpoint names case-insensitively.
            let endpoint_options = MirrorOptions {
                case_insensitive_names: true,
                ..options.clone()
            };
            let location = self.destination.location.clone();
            let result = mirror_resources(
                &self.source.arm.streaming_endpoints(),
                &self.destination.arm.streaming_endpoints(),
                |endpoint| Ok(kinds::prepare_streaming_endpoint(endpoint, &location)),
                &endpoint_options,
                &cancel,
            )
            .await;
            cancelled =
                record_kind_step(&mut report, "streaming endpoint", result) || cancel.is_cancelled();
        }

        if !cancelled {
            info!("Step 5 of 7: Replicate assets");
            let result = self
                .replicate_assets(&mut report, &strategy, &cancel, dry_run)
                .await;
            cancelled = match result {
                Ok(()) => cancel.is_cancelled(),
                Err(ReplicateError::Cancelled) => true,
                Err(err) => {
                    error!("asset replication step failed: {}", err);
                    report.failures.push(ItemFailure {
                        kind: "asset".into(),
                        name: "*".into(),
                        message: err.to_string(),
                    });
                    cancel.is_cancelled()
                }
            };
        }

        if !cancelled {
            info!("Step 6 of 7: Replicate streaming locators");
            let result = mirror_resources(
                &self.source.arm.streaming_locators(),
                &self.destination.arm.streaming_locators(),
                |locator| Ok(kinds::prepare_streaming_locator(locator)),
                &options,
                &cancel,
            )
            .await;
            cancelled =
                record_kind_step(&mut report, "streaming locator", result) || cancel.is_cancelled();
        }

        if !cancelled {
            info!("Step 7 of 7: Replicate live events");
            let result = self.replicate_live_events(&mut report, &options, &cancel).await;
            if let Err(err) = result {
                if matches!(err, ReplicateError::Cancelled) {
                    cancelled = true;
                } else {
                    error!("live event step failed: {}", err);
                    report.failures.push(ItemFailure {
                        kind: "live event".into(),
                        name: "*".into(),
                        message: err.to_string(),
                    });
                }
            }
        }

        report.completed_at = Utc::now();
        report.duration_seconds =
            (report.completed_at - report.started_at).num_milliseconds() as f64 / 1000.0;
        report.status = if cancelled {
            RunStatus::Cancelled
        } else if report.failure_count() > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let created: usize = report.kinds.iter().map(|k| k.created).sum();
        info!(
            "Replication {:?}: {} resources created, {} blobs copied, {} already present, {} failure(s) in {:.1}s",
            report.status,
            created,
            report.assets.blobs_copied,
            report.assets.blobs_already_present,
            report.failure_count(),
            report.duration_seconds,
        );

        Ok(report)
    }

    fn log_account_banner(&self) {
        let source = &self.config.source;
        let destination = &self.config.destination;
        info!(
            "Subscription ID: {} --> {}",
            source.subscription_id, destination.subscription_id
        );
        info!(
            "Media account: {} --> {}",
            source.account_name, destination.account_name
        );
        info!(
            "Resource group: {} --> {}",
            source.resource_group, destination.resource_group
        );
        info!(
            "Storage account: {} --> {}",
            source.storage_account_name, destination.storage_account_name
        );
        info!("Location: {} --> {}", source.location, destination.location);
    }

    /// Step 5: every source asset, in listing order.
    async fn replicate_assets(
        &self,
        report: &mut ReplicationReport,
        strategy: &Strategy,
        cancel: &CancellationToken,
        dry_run: bool,
    ) -> Result<()> {
        let source_assets = self.source.arm.assets();
        let destination_assets = self.destination.arm.assets();
        let filter_options = MirrorOptions {
            dry_run,
            case_insensitive_names: false,
        };
        let mut filter_totals = MirrorOutcome {
            kind: "asset filter".into(),
            created: 0,
            already_present: 0,
            failed: Vec::new(),
        };

        let mut pager = resource_pager(&source_assets);
        let mut seen_any = false;

        while let Some(asset) = pager.try_next().await? {
            if cancel.is_cancelled() {
                return Err(ReplicateError::Cancelled);
            }
            seen_any = true;
            report.assets.assets_total += 1;
            info!("Replicating asset '{}'...", asset.name);

            let result = self
                .replicate_one_asset(
                    &destination_assets,
                    &asset,
                    strategy,
                    report,
                    &mut filter_totals,
                    &filter_options,
                    cancel,
                    dry_run,
                )
                .await;

            match result {
                Ok(()) => {
                    report.assets.assets_replicated += 1;
                    info!("Replicating asset '{}' finished", asset.name);
                }
                Err(ReplicateError::Cancelled) => return Err(ReplicateError::Cancelled),
                Err(err) => {
                    warn!("asset '{}' failed: {}", asset.name, err);
                    report.failures.push(ItemFailure {
                        kind: "asset".into(),
                        name: asset.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if !seen_any {
            info!("No assets to copy");
        }
        if self.config.transfer.mirror_asset_filters {
            report.kinds.push(filter_totals);
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn replicate_one_asset<D>(
        &self,
        destination_assets: &D,
        asset: &Asset,
        strategy: &Strategy,
        report: &mut ReplicationReport,
        filter_totals: &mut MirrorOutcome,
        filter_options: &MirrorOptions,
        cancel: &CancellationToken,
        dry_run: bool,
    ) -> Result<()>
    where
        D: ResourceOperations<Resource = Asset>,
    {
        info!("Copying asset's blobs...");

        let destination_asset = ensure_destination_asset(destination_assets, asset, dry_run).await?;

        let source_container = asset.properties.container.clone().ok_or_else(|| {
            ReplicateError::transfer(&asset.name, "source asset has no container")
        })?;

        // In a dry run over a not-yet-created asset there is no destination
        // container; the diff treats it as empty.
        let destination_container = destination_asset
            .as_ref()
            .and_then(|a| a.properties.container.clone());

        let containers = ContainerPair {
            source: source_container,
            destination: destination_container
                .clone()
                .unwrap_or_else(|| format!("asset-{}", asset.name)),
        };

        match strategy {
            Strategy::WholeContainer(bulk) => {
                if dry_run {
                    info!(
                        "Would delegate container '{}' to bulk copy",
                        containers.source
                    );
                } else {
                    bulk.transfer_container(&containers, cancel).await?;
                }
            }
            Strategy::PerBlob(blob_strategy) => {
                let outcome = replicate_container_blobs(
                    self.source.store.clone(),
                    self.destination.store.clone(),
                    blob_strategy.clone(),
                    &containers,
                    destination_container.is_some(),
                    self.config.transfer.get_parallel_blob_transfers(),
                    dry_run,
                    cancel,
                )
                .await?;

                report.assets.blobs_copied += outcome.copied;
                report.assets.blobs_already_present += outcome.already_present;
                report.assets.blobs_failed += outcome.failures.len();
                report.asset_details.push(AssetBlobCounts {
                    asset: asset.name.clone(),
                    copied: outcome.copied,
                    already_present: outcome.already_present,
                    failed: outcome.failures.len(),
                });
                report.failures.extend(outcome.failures);
            }
        }

        if self.config.transfer.mirror_asset_filters {
            info!("Copying asset's filters...");
            let outcome = mirror_resources(
                &self.source.arm.asset_filters(&asset.name),
                &self.destination.arm.asset_filters(&asset.name),
                kinds::prepare_verbatim,
                filter_options,
                cancel,
            )
            .await?;
            filter_totals.created += outcome.created;
            filter_totals.already_present += outcome.already_present;
            filter_totals.failed.extend(outcome.failed);
        }

        Ok(())
    }

    /// Step 7: live events, each followed by its live outputs.
    async fn replicate_live_events(
        &self,
        report: &mut ReplicationReport,
        options: &MirrorOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let location = self.destination.location.clone();
        let result = mirror_resources(
            &self.source.arm.live_events(),
            &self.destination.arm.live_events(),
            |event| Ok(kinds::prepare_live_event(event, &location)),
            options,
            cancel,
        )
        .await;
        if record_kind_step(report, "live event", result) {
            return Err(ReplicateError::Cancelled);
        }

        let mut output_totals = MirrorOutcome {
            kind: "live output".into(),
            created: 0,
            already_present: 0,
            failed: Vec::new(),
        };

        let source_events = self.source.arm.live_events();
        let mut pager = resource_pager(&source_events);
        while let Some(event) = pager.try_next().await? {
            if cancel.is_cancelled() {
                return Err(ReplicateError::Cancelled);
            }
            info!("Copying live outputs of '{}'...", event.name);
            match mirror_resources(
                &self.source.arm.live_outputs(&event.name),
                &self.destination.arm.live_outputs(&event.name),
                kinds::prepare_verbatim,
                options,
                cancel,
            )
            .await
            {
                Ok(outcome) => {
                    output_totals.created += outcome.created;
                    output_totals.already_present += outcome.already_present;
                    output_totals.failed.extend(outcome.failed);
                }
                Err(ReplicateError::Cancelled) => return Err(ReplicateError::Cancelled),
                Err(err) => {
                    warn!("live outputs of '{}' failed: {}", event.name, err);
                    output_totals.failed.push(ItemFailure {
                        kind: "live output".into(),
                        name: event.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        report.kinds.push(output_totals);
        Ok(())
    }
}

/// Record a kind-level mirror result; returns true if the step was
/// cancelled.
fn record_kind_step(
    report: &mut ReplicationReport,
    kind: &str,
    result: Result<MirrorOutcome>,
) -> bool {
    match result {
        Ok(outcome) => {
            report.kinds.push(outcome);
            false
        }
        Err(ReplicateError::Cancelled) => true,
        Err(err) => {
            error!("{} step failed: {}", kind, err);
            report.failures.push(ItemFailure {
                kind: kind.to_string(),
                name: "*".into(),
                message: err.to_string(),
            });
            false
        }
    }
}

/// Get-or-create the destination asset and return its current record.
///
/// The create response may omit the server-assigned container name, so the
/// asset is always re-fetched after creation. Returns `None` only in a dry
/// run where the asset does not exist yet.
pub(crate) async fn ensure_destination_asset<D>(
    destination: &D,
    source_asset: &Asset,
    dry_run: bool,
) -> Result<Option<Asset>>
where
    D: ResourceOperations<Resource = Asset>,
{
    if let Some(existing) = destination.get(&source_asset.name).await? {
        return Ok(Some(existing));
    }

    if dry_run {
        info!("Would create asset '{}'", source_asset.name);
        return Ok(None);
    }

    destination
        .create(&source_asset.name, &source_asset.creation_record())
        .await?;

    let refetched = destination.get(&source_asset.name).await?;
    refetched.map(Some).ok_or_else(|| ReplicateError::Api {
        status: 404,
        code: "NotFound".into(),
        message: format!("asset {} missing after creation", source_asset.name),
    })
}

/// Outcome of one container's blob pass.
#[derive(Debug, Default)]
pub(crate) struct ContainerOutcome {
    pub to_copy: usize,
    pub already_present: usize,
    pub copied: usize,
    pub failures: Vec<ItemFailure>,
}

/// Diff one container pair and run the per-blob strategy over exactly the
/// to-copy set, with bounded parallelism.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn replicate_container_blobs(
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    strategy: Arc<BlobTransfer>,
    containers: &ContainerPair,
    destination_listable: bool,
    parallelism: usize,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<ContainerOutcome> {
    let source_blobs = list_all_blobs(source.as_ref(), &containers.source).await?;
    let destination_blobs = if destination_listable {
        list_all_blobs(destination.as_ref(), &containers.destination).await?
    } else {
        Vec::new()
    };

    let diff = diff_containers(&source_blobs, &destination_blobs);

    let mut outcome = ContainerOutcome {
        to_copy: diff.to_copy.len(),
        already_present: diff.already_present,
        ..ContainerOutcome::default()
    };

    if source_blobs.is_empty() {
        info!("No blobs to copy");
        return Ok(outcome);
    }

    if dry_run {
        for blob in &diff.to_copy {
            info!("Would copy '{}' ({} bytes)", blob.name, blob.size);
        }
        outcome.copied = diff.to_copy.len();
        return Ok(outcome);
    }

    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut jobs: JoinSet<(String, u64, Result<TransferOutcome>)> = JoinSet::new();
    let mut interrupted = false;

    for blob in diff.to_copy {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        info!("Copying '{}' ({} byte(s))...", blob.name, blob.size);

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("transfer semaphore closed");
        let strategy = strategy.clone();
        let containers = containers.clone();
        let cancel = cancel.clone();

        jobs.spawn(async move {
            let result = strategy.transfer_blob(&containers, &blob, &cancel).await;
            drop(permit);
            (blob.name, blob.size, result)
        });
    }

    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok((_, _, Ok(TransferOutcome::Success))) => outcome.copied += 1,
            Ok((name, _, Ok(terminal))) => {
                warn!("Copying '{}' stopped: {}", name, terminal.describe());
                outcome.failures.push(ItemFailure {
                    kind: "blob".into(),
                    name,
                    message: terminal.describe(),
                });
            }
            Ok((_, _, Err(ReplicateError::Cancelled))) => interrupted = true,
            Ok((name, _, Err(err))) => {
                warn!("Copying '{}' failed: {}", name, err);
                outcome.failures.push(ItemFailure {
                    kind: "blob".into(),
                    name,
                    message: err.to_string(),
                });
            }
            Err(join_err) => {
                outcome.failures.push(ItemFailure {
                    kind: "blob".into(),
                    name: "*".into(),
                    message: format!("transfer task panicked: {}", join_err),
                });
            }
        }
    }

    if interrupted {
        return Err(ReplicateError::Cancelled);
    }

    Ok(outcome)
}
