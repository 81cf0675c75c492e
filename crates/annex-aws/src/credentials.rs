//! Credential files
//!
//! The access key identifier and the secret key each live in their own file.
//! Both are re-read on every request so a rotated key takes effect without a
//! restart.

use crate::error::{QueryError, QueryResult};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Locations of the two credential files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFiles {
    pub access_key_file: PathBuf,
    pub secret_key_file: PathBuf,
}

impl CredentialFiles {
    pub fn new(access_key_file: impl Into<PathBuf>, secret_key_file: impl Into<PathBuf>) -> Self {
        Self {
            access_key_file: access_key_file.into(),
            secret_key_file: secret_key_file.into(),
        }
    }

    /// Trimmed contents of the access key file
    pub fn access_key_id(&self) -> QueryResult<String> {
        read_short_file(&self.access_key_file)
    }

    /// Trimmed contents of the secret key file
    pub fn secret_key(&self) -> QueryResult<SecretKey> {
        read_short_file(&self.secret_key_file).map(SecretKey)
    }
}

/// Signing key whose value never reaches logs or `Debug` output
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Read a small file completely, failing if fewer bytes arrive than the file
/// claims to hold.
fn read_short_file(path: &Path) -> QueryResult<String> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to open credential file");
        QueryError::file_io(path, e)
    })?;

    let expected = file
        .metadata()
        .map_err(|e| QueryError::file_io(path, e))?
        .len();

    let mut buf = Vec::with_capacity(expected as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| QueryError::file_io(path, e))?;

    if (buf.len() as u64) < expected {
        tracing::error!(
            path = %path.display(),
            expected = expected,
            read = buf.len(),
            "Failed to completely read credential file"
        );
        return Err(QueryError::file_io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("needed {} bytes but got {}", expected, buf.len()),
            ),
        ));
    }

    let contents = String::from_utf8(buf).map_err(|e| {
        QueryError::file_io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.utf8_error()),
        )
    })?;

    Ok(contents.trim().to_string())
}
