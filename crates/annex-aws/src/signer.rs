//! Signature version 2 request signing

use crate::credentials::SecretKey;
use crate::error::{QueryError, QueryResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `POST\n<host>\n<path>\n<canonical query string>`
pub fn string_to_sign(host: &str, path: &str, canonical_query: &str) -> String {
    format!("POST\n{}\n{}\n{}", host, path, canonical_query)
}

/// Base64 HMAC-SHA256 of `string_to_sign` under `key`
pub fn sign(key: &SecretKey, string_to_sign: &str) -> QueryResult<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| {
        tracing::error!("Unable to calculate SHA256 HMAC to sign query");
        QueryError::Internal(format!("unable to calculate query signature: {}", e))
    })?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        assert_eq!(
            string_to_sign("cloudformation.us-east-1.amazonaws.com", "/", "A=1&B=2"),
            "POST\ncloudformation.us-east-1.amazonaws.com\n/\nA=1&B=2"
        );
    }

    #[test]
    fn test_rfc4231_case_2() {
        // RFC 4231 test case 2, base64 of
        // 5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843
        let key = SecretKey::new("Jefe");
        let sig = sign(&key, "what do ya want for nothing?").unwrap();
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = SecretKey::new("secret");
        let a = sign(&key, "POST\nhost\n/\nAction=DescribeStacks").unwrap();
        let b = sign(&key, "POST\nhost\n/\nAction=DescribeStacks").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_byte_change_alters_signature() {
        let key = SecretKey::new("secret");
        let base = "POST\nhost\n/\nAction=DescribeStacks";
        let original = sign(&key, base).unwrap();
        for i in 0..base.len() {
            let mut bytes = base.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let altered = String::from_utf8(bytes).unwrap();
            assert_ne!(sign(&key, &altered).unwrap(), original, "byte {} collided", i);
        }
    }

    #[test]
    fn test_key_matters() {
        let msg = "POST\nhost\n/\nAction=DescribeStacks";
        assert_ne!(
            sign(&SecretKey::new("k1"), msg).unwrap(),
            sign(&SecretKey::new("k2"), msg).unwrap()
        );
    }
}
