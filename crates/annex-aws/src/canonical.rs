//! Canonical query string construction
//!
//! The provider recomputes the signature from the parameters it receives, so
//! the ordering and encoding rules here are part of the protocol:
//!
//! - parameters are sorted by name, byte-wise
//! - only `A-Z a-z 0-9 - _ . ~` are left as-is, every other byte becomes
//!   `%XY` with uppercase hex digits
//! - pairs are joined as `name=value` with `&`, no trailing separator
//!
//! Input is treated as bytes. Multi-byte UTF-8 sequences are encoded one byte
//! at a time, with no normalisation.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Signature method advertised on every request
pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// Signature version advertised on every request
pub const SIGNATURE_VERSION: &str = "2";

/// `YYYY-MM-DDThh:mm:ssZ`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Whether a byte is emitted without encoding
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode a parameter name or value
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(b >> 4) as usize] as char);
            out.push(HEX_UPPER[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Reverse of [`percent_encode`].
///
/// Returns `None` for truncated or non-hex escapes, or if the decoded bytes
/// are not UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Format a timestamp the way the `Timestamp` parameter expects
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// A request's full parameter set, fixed protocol parameters included
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    parameters: BTreeMap<String, String>,
}

impl CanonicalRequest {
    /// Merge caller parameters with the fixed protocol parameters.
    ///
    /// Fixed parameters overwrite caller-supplied values of the same name.
    pub fn new(
        action: &str,
        version: &str,
        access_key_id: &str,
        timestamp: DateTime<Utc>,
        parameters: &BTreeMap<String, String>,
    ) -> Self {
        let mut all = parameters.clone();
        all.insert("Action".to_string(), action.to_string());
        all.insert("Version".to_string(), version.to_string());
        all.insert("AWSAccessKeyId".to_string(), access_key_id.to_string());
        all.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
        all.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
        all.insert("Timestamp".to_string(), format_timestamp(timestamp));
        Self { parameters: all }
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Sorted, encoded `name=value&...` string.
    ///
    /// `BTreeMap<String, _>` iterates in byte-wise key order, which is the
    /// order the signature is verified against.
    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.parameters {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&percent_encode(name));
            out.push('=');
            out.push_str(&percent_encode(value));
        }
        out
    }
}

/// Append the signature parameter to an already canonical string
pub fn append_signature(canonical: &str, signature: &str) -> String {
    format!("{}&Signature={}", canonical, percent_encode(signature))
}

/// Copy of a query string with the access key value elided, for logging
pub fn redact_access_key(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("AWSAccessKeyId", _)) => "AWSAccessKeyId=...".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
