//! Annex Types - Core types for annex reconciliation
//!
//! An annex is an elastically-provisioned group of cloud workers temporarily
//! joined to a pool. Two systems describe the set of annexes:
//!
//! - **Directory**: the pool's advertisement store, which holds "the plan".
//!   An annex ad is inserted before the cloud group is requested.
//! - **Cloud**: the provider's stacks, which hold "the reality".
//!
//! ## Key Concepts
//!
//! - **ProjectId**: Stable tag joining an advertisement to a stack
//! - **ResourceGroup**: One cloud-side stack and its declared size
//! - **AnnexAdvertisement**: One directory-side record with opaque attributes
//! - **Finding**: A classified discrepancy between the two inventories
//! - **Events**: Outcome stream of reconciliation passes

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod finding;
pub mod ids;
pub mod inventory;

pub use events::{EventSeverity, PollEvent, PollEventEnvelope};
pub use finding::{Finding, FindingKind, FINDING_AD_TYPE};
pub use ids::{PassId, ProjectId};
pub use inventory::{
    AnnexAdvertisement, InventorySnapshot, ResourceGroup, StackMap, ATTR_DESIRED_SIZE,
    ATTR_PROJECT_ID,
};
