//! Signed query transport for the annex poller
//!
//! Requests follow the provider's query protocol, signature version 2:
//!
//! 1. [`canonical`] sorts and percent-encodes every parameter
//! 2. [`signer`] computes an HMAC-SHA256 over the canonical string
//! 3. [`transport`] POSTs the signed body over verified TLS
//!
//! [`stacks`] builds the describe-stacks inventory on top of the transport.

#![deny(unsafe_code)]

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod signer;
pub mod stacks;
pub mod transport;

pub use canonical::{percent_decode, percent_encode, CanonicalRequest};
pub use credentials::{CredentialFiles, SecretKey};
pub use error::{ErrorClass, QueryError, QueryResult, StackError};
pub use signer::{sign, string_to_sign};
pub use stacks::{DescribeStacks, StackFilter};
pub use transport::{QueryTransport, ServiceEndpoint, TransportConfig, TrustOverrides};
