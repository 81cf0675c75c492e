//! Error types for annex-aws

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Origin of a failure, used by operators to tell a bad deploy from a bad
/// network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Missing parameter, unparsable URL, unlocatable endpoint
    Configuration,
    /// Local file could not be read
    LocalIo,
    /// Signing primitive failed
    Cryptographic,
    /// DNS, TCP, TLS or timeout
    Transport,
    /// The remote side answered, but not with what was asked for
    Protocol,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::LocalIo => "local_io",
            ErrorClass::Cryptographic => "cryptographic",
            ErrorClass::Transport => "transport",
            ErrorClass::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of a single signed query
#[derive(Debug, Error)]
pub enum QueryError {
    /// Request carried no action, or carried one among its parameters
    #[error("no action specified in request")]
    NoAction,

    /// Signing primitive failed
    #[error("internal error: {0}")]
    Internal(String),

    /// Service URL lacks a scheme separator or a host
    #[error("failed to parse service URL '{0}'")]
    InvalidServiceUrl(String),

    /// Credential or CA file unreadable or short
    #[error("unable to read from file '{}': {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be configured
    #[error("HTTP client setup failed: {0}")]
    HttpLib(String),

    /// Network, TLS or timeout failure while sending
    #[error("request failed: {0}")]
    Transport(String),

    /// Service answered with a status other than 200
    #[error("HTTP response was {status}, not 200: {body}")]
    HttpResponseNot200 { status: u16, body: String },
}

impl QueryError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NoAction | QueryError::Internal(_) => "E_INTERNAL",
            QueryError::InvalidServiceUrl(_) => "E_INVALID_SERVICE_URL",
            QueryError::FileIo { .. } => "E_FILE_IO",
            QueryError::HttpLib(_) => "E_HTTP_LIB",
            QueryError::Transport(_) => "E_TRANSPORT_IO",
            QueryError::HttpResponseNot200 { .. } => "E_HTTP_RESPONSE_NOT_200",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            QueryError::Internal(_) => ErrorClass::Cryptographic,
            QueryError::NoAction | QueryError::InvalidServiceUrl(_) | QueryError::HttpLib(_) => {
                ErrorClass::Configuration
            }
            QueryError::FileIo { .. } => ErrorClass::LocalIo,
            QueryError::Transport(_) => ErrorClass::Transport,
            QueryError::HttpResponseNot200 { .. } => ErrorClass::Protocol,
        }
    }

    /// HTTP status of a protocol failure
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::HttpResponseNot200 { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QueryError::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Build a protocol error, substituting a message for an empty body
    pub(crate) fn not_200(status: u16, body: String) -> Self {
        let body = if body.is_empty() {
            format!("HTTP response was {}, not 200, and no body was returned.", status)
        } else {
            body
        };
        QueryError::HttpResponseNot200 { status, body }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            QueryError::HttpLib(e.to_string())
        } else {
            QueryError::Transport(e.to_string())
        }
    }
}

/// Failures of the describe-stacks inventory
#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Response body was not a describe-stacks document
    #[error("failed to decode stack description: {0}")]
    Decode(String),
}

impl StackError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StackError::Query(e) => e.class(),
            StackError::Decode(_) => ErrorClass::Protocol,
        }
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;
