//! Inventory sources
//!
//! A pass needs two inventories: the annex ads the directory holds and the
//! stacks the cloud holds. Each sits behind a trait so the engine can be
//! driven by the real services or by in-memory fixtures.

mod cloud;
mod directory;
mod memory;

pub use cloud::CloudStacks;
pub use directory::{locate_collector, DirectoryAds, COLLECTOR_HOST_VAR};
pub use memory::{InMemoryDirectory, InMemoryStacks};

use crate::error::DirectoryError;
use annex_aws::StackError;
use annex_types::{AnnexAdvertisement, StackMap};
use async_trait::async_trait;

/// Source of directory-side annex advertisements
#[async_trait]
pub trait AnnexDirectory: Send + Sync {
    /// Every ad of the annex class, or an error; never a partial list
    async fn fetch_annex_ads(&self) -> Result<Vec<AnnexAdvertisement>, DirectoryError>;
}

/// Source of cloud-side stacks
#[async_trait]
pub trait StackInventory: Send + Sync {
    /// Every live annex stack keyed by project identifier
    async fn fetch_stacks(&self) -> Result<StackMap, StackError>;
}
