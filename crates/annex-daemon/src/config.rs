//! Configuration for annexd

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Poll loop configuration
    #[serde(default)]
    pub poll: PollConfig,

    /// Cloud provider configuration
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Directory service configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Local identity resolution
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between passes
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Upper bound on each inventory fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

/// Cloud provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Query API endpoint
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// API version pinned on every request. Changing it changes the response
    /// fields the provider returns.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// File holding the access key identifier
    #[serde(default = "default_access_key_file")]
    pub access_key_file: PathBuf,

    /// File holding the secret key
    #[serde(default = "default_secret_key_file")]
    pub secret_key_file: PathBuf,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Stack tag carrying the project identifier
    #[serde(default = "default_project_tag")]
    pub project_tag: String,

    /// Stack parameter carrying the annex size
    #[serde(default = "default_size_parameter")]
    pub size_parameter: String,

    /// `Accept` header sent with each query
    #[serde(default = "default_accept")]
    pub accept: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            api_version: default_api_version(),
            access_key_file: default_access_key_file(),
            secret_key_file: default_secret_key_file(),
            request_timeout_secs: default_request_timeout(),
            project_tag: default_project_tag(),
            size_parameter: default_size_parameter(),
            accept: default_accept(),
        }
    }
}

/// Directory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Explicit endpoint; when unset the collector host lookup is used
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Ad class queried for annex records
    #[serde(default = "default_ad_class")]
    pub ad_class: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            ad_class: default_ad_class(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Local identity resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Host name to resolve; defaults to the system host name
    #[serde(default)]
    pub hostname: Option<String>,

    /// Lookups attempted before giving up
    #[serde(default = "default_identity_attempts")]
    pub max_attempts: u32,

    /// Seconds slept between attempts
    #[serde(default = "default_identity_delay")]
    pub retry_delay_secs: u64,

    /// Seconds a single lookup may take
    #[serde(default = "default_identity_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            max_attempts: default_identity_attempts(),
            retry_delay_secs: default_identity_delay(),
            lookup_timeout_secs: default_identity_lookup_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_poll_interval() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_service_url() -> String {
    "https://cloudformation.us-east-1.amazonaws.com".to_string()
}

fn default_api_version() -> String {
    "2010-05-15".to_string()
}

fn default_access_key_file() -> PathBuf {
    PathBuf::from("/etc/annexd/access_key")
}

fn default_secret_key_file() -> PathBuf {
    PathBuf::from("/etc/annexd/secret_key")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_project_tag() -> String {
    "ProjectID".to_string()
}

fn default_size_parameter() -> String {
    "Size".to_string()
}

fn default_accept() -> String {
    "application/json".to_string()
}

fn default_ad_class() -> String {
    "Generic".to_string()
}

fn default_identity_attempts() -> u32 {
    20
}

fn default_identity_delay() -> u64 {
    3
}

fn default_identity_lookup_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then `ANNEX__`
    /// environment variables (`ANNEX__POLL__INTERVAL_SECS=60`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ANNEX")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
