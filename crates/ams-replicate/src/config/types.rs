//! Configuration type definitions with auto-tuned defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuned defaults.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Number of CPU cores.
    pub cpu_cores: usize,
    /// Total RAM in GB.
    pub total_memory_gb: f64,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let cpu_cores = sys.cpus().len();
        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        Self {
            cpu_cores,
            total_memory_gb,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source account configuration.
    pub source: AccountConfig,

    /// Destination account configuration.
    pub destination: AccountConfig,

    /// Transfer behavior configuration.
    #[serde(default)]
    pub transfer: TransferSettings,
}

/// Per-account credentials and identifiers.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// AAD tenant the service principal lives in.
    pub tenant_id: String,

    /// Service principal application (client) id.
    pub client_id: String,

    /// Service principal secret.
    pub client_secret: String,

    /// Subscription holding the media account.
    pub subscription_id: String,

    /// Resource group holding the media account.
    pub resource_group: String,

    /// Media account name.
    pub account_name: String,

    /// Account region (used when re-creating location-bound resources).
    pub location: String,

    /// Storage account backing the media account's containers.
    pub storage_account_name: String,

    /// Storage account access key (SAS signing).
    pub storage_account_key: String,

    /// Management endpoint (default: public cloud).
    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,

    /// Storage endpoint DNS suffix (default: public cloud).
    #[serde(default = "default_storage_suffix")]
    pub storage_endpoint_suffix: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("account_name", &self.account_name)
            .field("location", &self.location)
            .field("storage_account_name", &self.storage_account_name)
            .field("storage_account_key", &"[REDACTED]")
            .field("arm_endpoint", &self.arm_endpoint)
            .field("storage_endpoint_suffix", &self.storage_endpoint_suffix)
            .finish()
    }
}

/// How blob content is moved between the two storage accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// Copy-from-URL issued against the destination; the service moves the
    /// bytes and is polled for completion.
    #[default]
    ServerSideCopy,

    /// Stream the bytes through this process (read source, upload blocks).
    LocalNetwork,

    /// Delegate whole containers to an external bulk-copy executable.
    ExternalBulkCopy,
}

/// Transfer behavior configuration.
/// Knobs that are `Option<T>` distinguish "not set" (auto-tuned or baseline
/// default) from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Transfer strategy for the whole run.
    #[serde(default)]
    pub mode: TransferMode,

    /// Path to the external bulk-copy executable (required for
    /// external-bulk-copy mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azcopy_path: Option<PathBuf>,

    /// Ask the bulk-copy tool to preserve blob access tiers.
    #[serde(default = "default_true")]
    pub preserve_access_tier: bool,

    /// Concurrent blob transfers within one container. Baseline is 1
    /// (strict listing order) if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_blob_transfers: Option<usize>,

    /// Block size for local-network uploads, in bytes.
    #[serde(default = "default_block_bytes")]
    pub upload_block_bytes: usize,

    /// Concurrent block uploads per blob. Auto-tuned from CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_concurrency: Option<usize>,

    /// Server-side copy poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single blob copy (poll loop, stream upload) and on
    /// bulk-copy output silence, in seconds.
    #[serde(default = "default_copy_timeout_secs")]
    pub copy_timeout_secs: u64,

    /// SAS credential lifetime in hours (1..=24).
    #[serde(default = "default_sas_expiry_hours")]
    pub sas_expiry_hours: u64,

    /// Mirror each asset's filters after its blobs.
    #[serde(default = "default_true")]
    pub mirror_asset_filters: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            mode: TransferMode::default(),
            azcopy_path: None,
            preserve_access_tier: true,
            parallel_blob_transfers: None,
            upload_block_bytes: default_block_bytes(),
            upload_concurrency: None,
            poll_interval_ms: default_poll_interval_ms(),
            copy_timeout_secs: default_copy_timeout_secs(),
            sas_expiry_hours: default_sas_expiry_hours(),
            mirror_asset_filters: true,
        }
    }
}

impl TransferSettings {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        if self.upload_concurrency.is_none() {
            let tuned = resources.cpu_cores.clamp(1, 8);
            info!("Auto-tuned upload_concurrency: {}", tuned);
            self.upload_concurrency = Some(tuned);
        }
        self
    }

    /// Concurrent blob transfers per container (baseline: 1).
    pub fn get_parallel_blob_transfers(&self) -> usize {
        self.parallel_blob_transfers.unwrap_or(1).max(1)
    }

    /// Concurrent block uploads per blob.
    pub fn get_upload_concurrency(&self) -> usize {
        self.upload_concurrency.unwrap_or(4).max(1)
    }
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.transfer = self.transfer.with_auto_tuning(&resources);
        self
    }
}

fn default_arm_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_storage_suffix() -> String {
    "core.windows.net".to_string()
}

fn default_true() -> bool {
    true
}

fn default_block_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_copy_timeout_secs() -> u64 {
    7200
}

fn default_sas_expiry_hours() -> u64 {
    24
}
