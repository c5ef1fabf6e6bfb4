//! Object-storage driver: blob REST client and SAS minting.

mod client;
pub mod sas;

pub use client::StorageAccount;
pub use sas::{SasScope, SAS_VERSION};
