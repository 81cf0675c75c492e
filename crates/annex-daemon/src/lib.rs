//! annexd library
//!
//! This module provides the core components of the annex poller:
//! - Directory and cloud inventory sources
//! - Pure reconciliation of the two inventories
//! - The pass engine and poll scheduler
//! - Local identity resolution and daemon lifecycle

pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod reconcile;
pub mod scheduler;

pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use engine::{PassReport, ReconcileEngine};
pub use error::{DaemonError, DaemonResult, DirectoryError, IdentityError, PassError};
pub use inventory::{AnnexDirectory, CloudStacks, DirectoryAds, StackInventory};
pub use reconcile::reconcile;
pub use scheduler::Poller;
