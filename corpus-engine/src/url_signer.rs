//! Signed, time-limited download URLs (§4.7.1): HMAC-SHA256 over
//! `path|expiry`, mirroring the share-link pattern other local-first
//! context tools in this corpus use. Rotation is just re-signing on next
//! access — no background job revokes anything.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{EngineRuntimeError, Result};

type HmacSha256 = Hmac<Sha256>;

pub trait UrlSigner: Send + Sync {
    /// Produces `{path}?expires={unix_ts}&sig={hex}` for out-of-band
    /// download, valid until `expires_at`.
    fn sign(&self, path: &str, expires_at: DateTime<Utc>) -> String;

    /// Verifies a previously signed URL's path/expiry/signature tuple.
    /// Rejects both a tampered signature and one past `expires_at`.
    fn verify(&self, path: &str, expires_at: DateTime<Utc>, signature: &str) -> Result<()>;
}

pub struct HmacUrlSigner {
    secret: Vec<u8>,
}

impl HmacUrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn compute(&self, path: &str, expires_at: DateTime<Utc>) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(format!("{path}|{}", expires_at.timestamp()).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, path: &str, expires_at: DateTime<Utc>) -> String {
        let sig = self.compute(path, expires_at);
        format!("{path}?expires={}&sig={sig}", expires_at.timestamp())
    }

    fn verify(&self, path: &str, expires_at: DateTime<Utc>, signature: &str) -> Result<()> {
        if Utc::now() > expires_at {
            return Err(EngineRuntimeError::Portability(format!("signed URL for '{path}' has expired")));
        }
        let expected = self.compute(path, expires_at);
        if expected != signature {
            return Err(EngineRuntimeError::Portability(format!("signed URL for '{path}' has an invalid signature")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn a_freshly_signed_url_verifies() {
        let signer = HmacUrlSigner::new(b"test-secret".to_vec());
        let expires_at = Utc::now() + Duration::minutes(15);
        let url = signer.sign("alice/doc-1/export.zip", expires_at);
        let sig = url.split("sig=").nth(1).unwrap();
        assert!(signer.verify("alice/doc-1/export.zip", expires_at, sig).is_ok());
    }

    #[test]
    fn an_expired_url_is_rejected() {
        let signer = HmacUrlSigner::new(b"test-secret".to_vec());
        let expires_at = Utc::now() - Duration::minutes(1);
        let url = signer.sign("alice/doc-1/export.zip", expires_at);
        let sig = url.split("sig=").nth(1).unwrap();
        assert!(signer.verify("alice/doc-1/export.zip", expires_at, sig).is_err());
    }

    #[test]
    fn a_tampered_signature_is_rejected() {
        let signer = HmacUrlSigner::new(b"test-secret".to_vec());
        let expires_at = Utc::now() + Duration::minutes(15);
        assert!(signer.verify("alice/doc-1/export.zip", expires_at, "deadbeef").is_err());
    }
}
