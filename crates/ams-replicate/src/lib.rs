//! # ams-replicate
//!
//! Media account replication library.
//!
//! Replicates the contents of a cloud media account (metadata resources
//! plus the binary blobs backing its assets) into a second account, with:
//!
//! - **Idempotent mirroring** - every resource kind is get-or-create by
//!   name; existing destination resources are never touched
//! - **Container diffing** - only blobs missing at the destination are
//!   transferred, which also makes interrupted runs resumable
//! - **Three transfer strategies** - server-side copy, local streaming,
//!   or delegation to an external bulk-copy tool
//! - **Bounded waits** - every poll loop, upload and subprocess read is
//!   timeout-bounded and cancellation-aware
//!
//! ## Example
//!
//! ```rust,no_run
//! use ams_replicate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ams_replicate::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config)?;
//!     let report = orchestrator.run(CancellationToken::new(), false).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod arm;
pub mod config;
pub mod core;
pub mod error;
pub mod mirror;
pub mod orchestrator;
pub mod storage;
pub mod transfer;

// Re-exports for convenient access
pub use config::{AccountConfig, Config, TransferMode, TransferSettings};
pub use error::{ReplicateError, Result};
pub use orchestrator::{HealthReport, Orchestrator, ReplicationReport, RunStatus};
