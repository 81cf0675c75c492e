//! Signed query transport
//!
//! `send` is a straight pipeline: parameters → canonical string → signature →
//! POST → body. Nothing from one request is kept for the next, so a single
//! transport can be shared between tasks.

use crate::canonical::{append_signature, redact_access_key, CanonicalRequest};
use crate::credentials::CredentialFiles;
use crate::error::{QueryError, QueryResult};
use crate::signer::{sign, string_to_sign};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Certificate, Client, StatusCode, Url};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables naming a CA directory, in precedence order
pub const CA_DIR_VARS: [&str; 2] = ["X509_CERT_DIR", "SOAP_SSL_CA_DIR"];

/// Environment variables naming a CA bundle file, in precedence order
pub const CA_FILE_VARS: [&str; 2] = ["X509_CERT_FILE", "SOAP_SSL_CA_FILE"];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Service URL split into the pieces the signature covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// URL requests are POSTed to, verbatim
    pub url: String,
    /// Host header value, lowercased
    pub host: String,
    /// Request path, `/` when the URL has none
    pub path: String,
}

impl ServiceEndpoint {
    pub fn parse(service_url: &str) -> QueryResult<Self> {
        let invalid = || {
            tracing::error!(url = %service_url, "Failed to parse service URL");
            QueryError::InvalidServiceUrl(service_url.to_string())
        };

        // An authority must follow the scheme separator
        let authority = service_url
            .split_once("://")
            .and_then(|(_, rest)| rest.split(['/', '?', '#']).next());
        if authority.map_or(true, str::is_empty) {
            return Err(invalid());
        }

        let url = Url::parse(service_url).map_err(|_| invalid())?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(invalid)?
            .to_ascii_lowercase();
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };
        let path = match url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            url: service_url.to_string(),
            host,
            path,
        })
    }
}

/// CA locations that replace the built-in trust roots.
///
/// Verification itself is never optional; these only say where trusted roots
/// come from. When either is set, no other root is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustOverrides {
    pub ca_dir: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

impl TrustOverrides {
    /// Resolve overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Resolve overrides through an arbitrary lookup.
    ///
    /// Within each pair the first defined, non-empty variable wins.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.is_empty())
                .map(PathBuf::from)
        };

        Self {
            ca_dir: first(&CA_DIR_VARS),
            ca_file: first(&CA_FILE_VARS),
        }
    }

    /// True when the built-in roots are used as-is
    pub fn is_empty(&self) -> bool {
        self.ca_dir.is_none() && self.ca_file.is_none()
    }

    fn certificates(&self) -> QueryResult<Vec<Certificate>> {
        let mut certs = Vec::new();

        if let Some(dir) = &self.ca_dir {
            tracing::debug!(path = %dir.display(), "Setting CA path");
            certs.extend(load_ca_dir(dir)?);
        }

        if let Some(file) = &self.ca_file {
            tracing::debug!(path = %file.display(), "Setting CA file");
            certs.extend(load_pem_bundle(file)?);
        }

        Ok(certs)
    }
}

/// Load every certificate in a CA directory.
///
/// Hashed names such as `5ad8a5d6.0` are read like any other file; files
/// holding no certificate are skipped.
fn load_ca_dir(dir: &Path) -> QueryResult<Vec<Certificate>> {
    let entries = std::fs::read_dir(dir).map_err(|e| QueryError::file_io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| QueryError::file_io(dir, e))?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut certs = Vec::new();
    for path in paths {
        match load_pem_bundle(&path) {
            Ok(found) => certs.extend(found),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping CA directory entry"),
        }
    }

    if certs.is_empty() {
        return Err(QueryError::HttpLib(format!(
            "no certificates found in CA directory '{}'",
            dir.display()
        )));
    }

    Ok(certs)
}

fn load_pem_bundle(path: &Path) -> QueryResult<Vec<Certificate>> {
    let bytes = std::fs::read(path).map_err(|e| QueryError::file_io(path, e))?;

    let certs = Certificate::from_pem_bundle(&bytes).map_err(|e| {
        QueryError::HttpLib(format!("invalid certificate in '{}': {}", path.display(), e))
    })?;

    if certs.is_empty() {
        return Err(QueryError::HttpLib(format!(
            "no certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Service URL, e.g. `https://cloudformation.us-east-1.amazonaws.com`
    pub service_url: String,

    /// Pinned API version sent as `Version`
    pub api_version: String,

    /// Credential file locations
    pub credentials: CredentialFiles,

    /// CA overrides
    pub trust: TrustOverrides,

    /// Per-request timeout
    pub timeout: Duration,

    /// Optional `Accept` header
    pub accept: Option<String>,
}

impl TransportConfig {
    pub fn new(
        service_url: impl Into<String>,
        api_version: impl Into<String>,
        credentials: CredentialFiles,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            api_version: api_version.into(),
            credentials,
            trust: TrustOverrides::default(),
            timeout: Duration::from_secs(30),
            accept: None,
        }
    }

    pub fn with_trust(mut self, trust: TrustOverrides) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }
}

/// A signed request ready to be sent
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub endpoint: ServiceEndpoint,
    /// Canonical query string with `Signature` appended
    pub body: String,
}

/// Client for the provider's signed query API
#[derive(Debug, Clone)]
pub struct QueryTransport {
    client: Client,
    config: TransportConfig,
}

impl QueryTransport {
    /// Build the HTTP client, loading any CA overrides.
    pub fn new(config: TransportConfig) -> QueryResult<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("annexd/", env!("CARGO_PKG_VERSION")));

        if !config.trust.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
            for cert in config.trust.certificates()? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| QueryError::HttpLib(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Canonicalise and sign a request without sending it.
    ///
    /// `parameters` must not carry `Action`; it is passed separately.
    pub fn sign_request(
        &self,
        action: &str,
        parameters: &BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> QueryResult<SignedRequest> {
        if action.is_empty() || parameters.contains_key("Action") {
            tracing::error!("No action specified in request, failing");
            return Err(QueryError::NoAction);
        }

        let endpoint = ServiceEndpoint::parse(&self.config.service_url)?;
        let access_key_id = self.config.credentials.access_key_id()?;

        let canonical = CanonicalRequest::new(
            action,
            &self.config.api_version,
            &access_key_id,
            timestamp,
            parameters,
        )
        .to_query_string();

        let to_sign = string_to_sign(&endpoint.host, &endpoint.path, &canonical);
        let secret = self.config.credentials.secret_key()?;
        let signature = sign(&secret, &to_sign)?;

        Ok(SignedRequest {
            endpoint,
            body: append_signature(&canonical, &signature),
        })
    }

    /// Send one signed query and return the response body.
    ///
    /// Never retries. Any status other than 200 is an error carrying the
    /// status and the body.
    pub async fn send(
        &self,
        action: &str,
        parameters: &BTreeMap<String, String>,
    ) -> QueryResult<String> {
        let request = self.sign_request(action, parameters, Utc::now())?;

        tracing::debug!(
            url = %request.endpoint.url,
            body = %redact_access_key(&request.body),
            "Sending signed query"
        );

        let mut builder = self
            .client
            .post(&request.endpoint.url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(request.body);
        if let Some(accept) = &self.config.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(action = action, error = %e, "Query transport failed");
            QueryError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::error!(action = action, error = %e, "Failed to read query response");
            QueryError::Transport(e.to_string())
        })?;

        if status != StatusCode::OK {
            tracing::error!(
                action = action,
                status = status.as_u16(),
                response = %body,
                "Query did not return 200"
            );
            return Err(QueryError::not_200(status.as_u16(), body));
        }

        tracing::trace!(action = action, response = %body, "Query succeeded");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::percent_decode;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::io::Write;

    const ROOT_PEM: &str = include_str!("../tests/fixtures/isrg-root-x2.pem");

    fn creds() -> (tempfile::NamedTempFile, tempfile::NamedTempFile, CredentialFiles) {
        let mut access = tempfile::NamedTempFile::new().unwrap();
        access.write_all(b"AKIDEXAMPLE\n").unwrap();
        let mut secret = tempfile::NamedTempFile::new().unwrap();
        secret.write_all(b"secret-key\n").unwrap();
        let files = CredentialFiles::new(access.path(), secret.path());
        (access, secret, files)
    }

    #[test]
    fn test_endpoint_parse() {
        let ep = ServiceEndpoint::parse("https://CloudFormation.us-east-1.amazonaws.com").unwrap();
        assert_eq!(ep.host, "cloudformation.us-east-1.amazonaws.com");
        assert_eq!(ep.path, "/");

        let ep = ServiceEndpoint::parse("https://example.com:8443/api/v1").unwrap();
        assert_eq!(ep.host, "example.com:8443");
        assert_eq!(ep.path, "/api/v1");
    }

    #[test]
    fn test_endpoint_parse_keeps_query_out_of_signed_path() {
        let ep = ServiceEndpoint::parse("https://Example.com:8443/p?x=1").unwrap();
        assert_eq!(ep.host, "example.com:8443");
        assert_eq!(ep.path, "/p");
        assert_eq!(ep.url, "https://Example.com:8443/p?x=1");

        // Default port is left out of the Host header
        let ep = ServiceEndpoint::parse("https://example.com:443?Foo=bar").unwrap();
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.path, "/");
    }

    #[test]
    fn test_endpoint_parse_failures() {
        for bad in ["example.com", "https://", "https:///path", ""] {
            let err = ServiceEndpoint::parse(bad).unwrap_err();
            assert_eq!(err.code(), "E_INVALID_SERVICE_URL", "{}", bad);
        }
    }

    #[test]
    fn test_trust_overrides_first_defined_wins() {
        let env: HashMap<&str, &str> = [
            ("X509_CERT_DIR", "/etc/x509/dir"),
            ("SOAP_SSL_CA_DIR", "/etc/soap/dir"),
            ("SOAP_SSL_CA_FILE", "/etc/soap/file.pem"),
        ]
        .into_iter()
        .collect();

        let trust = TrustOverrides::from_lookup(|k| env.get(k).map(OsString::from));
        assert_eq!(trust.ca_dir, Some(PathBuf::from("/etc/x509/dir")));
        assert_eq!(trust.ca_file, Some(PathBuf::from("/etc/soap/file.pem")));
    }

    #[test]
    fn test_trust_overrides_absent() {
        let trust = TrustOverrides::from_lookup(|_| None);
        assert_eq!(trust, TrustOverrides::default());
    }

    #[test]
    fn test_trust_overrides_is_empty() {
        assert!(TrustOverrides::default().is_empty());

        let trust = TrustOverrides::from_lookup(|k| (k == "SOAP_SSL_CA_DIR").then(|| OsString::from("/ca")));
        assert!(!trust.is_empty());
        assert_eq!(trust.ca_dir, Some(PathBuf::from("/ca")));
    }

    #[test]
    fn test_ca_dir_loads_hashed_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0b9bc432.0"), ROOT_PEM).unwrap();
        std::fs::write(dir.path().join("0b9bc432.r0"), "not a certificate").unwrap();

        let trust = TrustOverrides {
            ca_dir: Some(dir.path().to_path_buf()),
            ca_file: None,
        };
        assert_eq!(trust.certificates().unwrap().len(), 1);

        let (_a, _s, files) = creds();
        let config = TransportConfig::new("https://example.com", "2010-05-15", files).with_trust(trust);
        assert!(QueryTransport::new(config).is_ok());
    }

    #[test]
    fn test_ca_dir_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), "nothing here").unwrap();

        let trust = TrustOverrides {
            ca_dir: Some(dir.path().to_path_buf()),
            ca_file: None,
        };
        let (_a, _s, files) = creds();
        let config = TransportConfig::new("https://example.com", "2010-05-15", files).with_trust(trust);
        let err = QueryTransport::new(config).unwrap_err();
        assert_eq!(err.code(), "E_HTTP_LIB");
    }

    #[test]
    fn test_ca_file_bundle() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        write!(ca, "{}\n{}", ROOT_PEM, ROOT_PEM).unwrap();
        let trust = TrustOverrides {
            ca_dir: None,
            ca_file: Some(ca.path().to_path_buf()),
        };
        assert_eq!(trust.certificates().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_ca_file_is_file_io() {
        let trust = TrustOverrides {
            ca_dir: None,
            ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
        };
        let (_a, _s, files) = creds();
        let config = TransportConfig::new("https://example.com", "2010-05-15", files).with_trust(trust);
        let err = QueryTransport::new(config).unwrap_err();
        assert_eq!(err.code(), "E_FILE_IO");
    }

    #[test]
    fn test_garbage_ca_file_is_rejected() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        ca.write_all(b"not a certificate").unwrap();
        let trust = TrustOverrides {
            ca_dir: None,
            ca_file: Some(ca.path().to_path_buf()),
        };
        let (_a, _s, files) = creds();
        let config = TransportConfig::new("https://example.com", "2010-05-15", files).with_trust(trust);
        let err = QueryTransport::new(config).unwrap_err();
        assert_eq!(err.code(), "E_HTTP_LIB");
    }

    #[test]
    fn test_sign_request_rejects_missing_action() {
        let (_a, _s, files) = creds();
        let transport =
            QueryTransport::new(TransportConfig::new("https://example.com", "2010-05-15", files)).unwrap();

        let err = transport
            .sign_request("", &BTreeMap::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "E_INTERNAL");

        let mut params = BTreeMap::new();
        params.insert("Action".to_string(), "DescribeStacks".to_string());
        let err = transport
            .sign_request("DescribeStacks", &params, Utc::now())
            .unwrap_err();
        assert!(matches!(err, QueryError::NoAction));
    }

    #[test]
    fn test_sign_request_body_layout() {
        let (_a, _s, files) = creds();
        let transport = QueryTransport::new(TransportConfig::new(
            "https://Example.com/service",
            "2010-05-15",
            files.clone(),
        ))
        .unwrap();
        let at = Utc.with_ymd_and_hms(2017, 3, 14, 9, 26, 53).unwrap();

        let mut params = BTreeMap::new();
        params.insert("StackName".to_string(), "annex one".to_string());
        let signed = transport.sign_request("DescribeStacks", &params, at).unwrap();

        assert_eq!(signed.endpoint.host, "example.com");
        assert_eq!(signed.endpoint.path, "/service");

        let (canonical, signature) = signed.body.rsplit_once("&Signature=").unwrap();
        assert!(canonical.starts_with("AWSAccessKeyId=AKIDEXAMPLE&Action=DescribeStacks&"));
        assert!(canonical.contains("StackName=annex%20one"));

        let expected = sign(
            &files.secret_key().unwrap(),
            &string_to_sign("example.com", "/service", canonical),
        )
        .unwrap();
        assert_eq!(percent_decode(signature).unwrap(), expected);
    }

    #[test]
    fn test_sign_request_missing_credentials() {
        let files = CredentialFiles::new("/nonexistent/a", "/nonexistent/s");
        let transport =
            QueryTransport::new(TransportConfig::new("https://example.com", "2010-05-15", files)).unwrap();
        let err = transport
            .sign_request("DescribeStacks", &BTreeMap::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "E_FILE_IO");
    }
}
