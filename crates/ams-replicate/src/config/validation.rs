//! Configuration validation.

use super::{Config, TransferMode};
use crate::error::{ReplicateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_account("source", &config.source)?;
    validate_account("destination", &config.destination)?;

    // Replicating an account onto itself would diff every container
    // against itself and copy nothing, which is never what the operator meant.
    if config.source.account_name == config.destination.account_name
        && config.source.subscription_id == config.destination.subscription_id
        && config.source.resource_group == config.destination.resource_group
    {
        return Err(ReplicateError::Config(
            "source and destination cannot be the same media account".into(),
        ));
    }
    if config.source.storage_account_name == config.destination.storage_account_name {
        return Err(ReplicateError::Config(
            "source and destination cannot share a storage account".into(),
        ));
    }

    let transfer = &config.transfer;
    if transfer.mode == TransferMode::ExternalBulkCopy && transfer.azcopy_path.is_none() {
        return Err(ReplicateError::Config(
            "transfer.azcopy_path is required for external-bulk-copy mode".into(),
        ));
    }
    if !(1..=24).contains(&transfer.sas_expiry_hours) {
        return Err(ReplicateError::Config(format!(
            "transfer.sas_expiry_hours must be between 1 and 24, got {}",
            transfer.sas_expiry_hours
        )));
    }
    if transfer.upload_block_bytes == 0 {
        return Err(ReplicateError::Config(
            "transfer.upload_block_bytes must be at least 1".into(),
        ));
    }
    if transfer.poll_interval_ms == 0 {
        return Err(ReplicateError::Config(
            "transfer.poll_interval_ms must be at least 1".into(),
        ));
    }
    if let Some(0) = transfer.parallel_blob_transfers {
        return Err(ReplicateError::Config(
            "transfer.parallel_blob_transfers must be at least 1".into(),
        ));
    }
    if let Some(0) = transfer.upload_concurrency {
        return Err(ReplicateError::Config(
            "transfer.upload_concurrency must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_account(label: &str, account: &super::AccountConfig) -> Result<()> {
    let required = [
        ("tenant_id", &account.tenant_id),
        ("client_id", &account.client_id),
        ("client_secret", &account.client_secret),
        ("subscription_id", &account.subscription_id),
        ("resource_group", &account.resource_group),
        ("account_name", &account.account_name),
        ("location", &account.location),
        ("storage_account_name", &account.storage_account_name),
        ("storage_account_key", &account.storage_account_key),
    ];

    for (field, value) in required {
        if value.is_empty() {
            return Err(ReplicateError::Config(format!(
                "{}.{} is required",
                label, field
            )));
        }
    }

    Ok(())
}
