//! Error types for annexd

use annex_aws::{ErrorClass, QueryError, StackError};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Directory could not be located or queried at startup
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Cloud transport could not be set up
    #[error("Cloud transport error: {0}")]
    Query(#[from] QueryError),

    /// A one-shot pass aborted
    #[error("Poll pass aborted: {0}")]
    Pass(#[from] PassError),
}

/// Directory inventory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No endpoint configured or discoverable
    #[error("unable to locate default collector: {0}")]
    Locate(String),

    /// Request never completed
    #[error("directory query failed: {0}")]
    Transport(String),

    /// Directory answered with an error status
    #[error("directory returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response was not a list of ads
    #[error("failed to decode directory response: {0}")]
    Decode(String),
}

impl DirectoryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DirectoryError::Locate(_) => ErrorClass::Configuration,
            DirectoryError::Transport(_) => ErrorClass::Transport,
            DirectoryError::Status { .. } | DirectoryError::Decode(_) => ErrorClass::Protocol,
        }
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DirectoryError::Decode(e.to_string())
        } else {
            DirectoryError::Transport(e.to_string())
        }
    }
}

/// Which inventory a pass was fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySource {
    Directory,
    Cloud,
}

impl std::fmt::Display for InventorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InventorySource::Directory => f.write_str("directory"),
            InventorySource::Cloud => f.write_str("cloud"),
        }
    }
}

/// Reasons a reconciliation pass aborts
#[derive(Debug, Error)]
pub enum PassError {
    #[error("failed to get annex ads from the directory: {0}")]
    Directory(#[source] DirectoryError),

    #[error("failed to get stacks from the cloud: {0}")]
    Cloud(#[source] StackError),

    #[error("{inventory} fetch timed out after {seconds}s")]
    Timeout {
        inventory: InventorySource,
        seconds: u64,
    },
}

impl PassError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PassError::Directory(e) => e.class(),
            PassError::Cloud(e) => e.class(),
            PassError::Timeout { .. } => ErrorClass::Transport,
        }
    }
}

/// Local identity resolution errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Lookup failed in a way retrying will not fix
    #[error("could not look up '{host}': {reason}")]
    Lookup { host: String, reason: String },

    /// Transient failures persisted past the attempt cap
    #[error("lookup of '{host}' never succeeded after {attempts} attempts")]
    Exhausted { host: String, attempts: u32 },
}

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
