//! Presigned-URL capability tokens (§4.4 Two-phase upload / Download).
//!
//! The reference [`crate::object_store::InMemoryObjectStore`] has no real
//! HTTPS endpoint to sign a URL for, so it seals `(object_key, expires_at)`
//! into an opaque token with `vault-crypto`'s AEAD under a server-held key —
//! the same authenticate-then-trust shape a real presigned S3/B2 URL gives
//! the client, without standing up an object-storage dependency.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vault_crypto::Secret32;

use crate::error::RegistryError;

/// Bound from spec.md §4.4 Download: `0 < ttl <= 24h`.
pub fn validate_ttl(ttl: Duration) -> Result<(), RegistryError> {
    if ttl <= Duration::zero() || ttl > Duration::hours(24) {
        return Err(RegistryError::Validation(
            "presigned URL ttl must be > 0 and <= 24h".into(),
        ));
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    object_key: String,
    expires_at: DateTime<Utc>,
}

/// Seals and opens capability tokens under one server-held AEAD key.
pub struct CapabilitySigner {
    key: Secret32,
}

impl CapabilitySigner {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key: Secret32::new(key) }
    }

    fn seal_payload(&self, payload: &TokenPayload) -> Result<String, RegistryError> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| RegistryError::IoObject(format!("serialize capability token: {e}")))?;
        let sealed = self
            .key
            .with_exposed(|k| vault_crypto::aead_encrypt(&json, k))
            .map_err(|e| RegistryError::IoObject(format!("seal capability token: {e}")))?;
        Ok(vault_crypto::encode_b64(&sealed.nonce, &sealed.ciphertext))
    }

    pub fn seal(&self, object_key: &str, ttl: Duration) -> Result<(String, DateTime<Utc>), RegistryError> {
        validate_ttl(ttl)?;
        let expires_at = Utc::now() + ttl;
        let payload = TokenPayload {
            object_key: object_key.to_string(),
            expires_at,
        };
        let token = self.seal_payload(&payload)?;
        Ok((token, expires_at))
    }

    /// Opens `token`, returning the object key it authorizes. Fails if the
    /// token is malformed, forged, or past its `expires_at`.
    pub fn open(&self, token: &str) -> Result<String, RegistryError> {
        let (nonce, ciphertext) = vault_crypto::decode_b64(token)
            .map_err(|_| RegistryError::Validation("malformed presigned token".into()))?;
        let plaintext = self
            .key
            .with_exposed(|k| vault_crypto::aead_decrypt(&ciphertext, &nonce, k))
            .map_err(|_| RegistryError::Validation("invalid or forged presigned token".into()))?;
        let payload: TokenPayload = serde_json::from_slice(&plaintext)
            .map_err(|_| RegistryError::Validation("malformed presigned token payload".into()))?;
        if payload.expires_at < Utc::now() {
            return Err(RegistryError::Validation("presigned token has expired".into()));
        }
        Ok(payload.object_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrips_to_the_right_object_key() {
        let signer = CapabilitySigner::new([7u8; 32]);
        let (token, _) = signer.seal("users/u1/files/f1", Duration::hours(1)).unwrap();
        assert_eq!(signer.open(&token).unwrap(), "users/u1/files/f1");
    }

    #[test]
    fn rejects_ttl_out_of_bounds() {
        let signer = CapabilitySigner::new([7u8; 32]);
        assert!(signer.seal("k", Duration::zero()).is_err());
        assert!(signer.seal("k", Duration::hours(25)).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let signer = CapabilitySigner::new([7u8; 32]);
        let payload = TokenPayload {
            object_key: "k".into(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        let token = signer.seal_payload(&payload).unwrap();
        assert!(signer.open(&token).is_err());
    }

    #[test]
    fn rejects_token_from_a_different_signer() {
        let signer = CapabilitySigner::new([7u8; 32]);
        let other_signer = CapabilitySigner::new([9u8; 32]);
        let (token, _) = signer.seal("k", Duration::hours(1)).unwrap();
        assert!(other_signer.open(&token).is_err());
    }
}
