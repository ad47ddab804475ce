//! Conversions between the client's raw-byte key representation
//! ([`vault_keys::EncryptedKey`]) and the wire/JSON representation the
//! server speaks ([`vault_server::EncryptedFileKey`], §6.1). No plaintext
//! ever flows through here — only re-framing of already-opaque ciphertext.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use vault_keys::{EncryptedKey, HistoricalKey};
use vault_server::{EncryptedFileKey, EncryptedFileKeyHistory};

use crate::error::SyncError;

fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode(s: &str) -> Result<Vec<u8>, SyncError> {
    URL_SAFE_NO_PAD.decode(s).map_err(|_| SyncError::CryptoFormat("malformed base64 in wire key field".into()))
}

fn nonce_array(bytes: Vec<u8>) -> Result<[u8; vault_crypto::NONCE_BYTES], SyncError> {
    bytes
        .try_into()
        .map_err(|_| SyncError::CryptoFormat("wire nonce is not 24 bytes".into()))
}

pub fn to_wire(key: &EncryptedKey) -> EncryptedFileKey {
    EncryptedFileKey {
        key_version: key.key_version,
        ciphertext_b64: encode(&key.ciphertext),
        nonce_b64: encode(&key.nonce),
        previous_keys: key
            .previous_keys
            .iter()
            .map(|h| EncryptedFileKeyHistory {
                key_version: h.key_version,
                ciphertext_b64: encode(&h.ciphertext),
                nonce_b64: encode(&h.nonce),
            })
            .collect(),
    }
}

pub fn from_wire(wire: &EncryptedFileKey) -> Result<EncryptedKey, SyncError> {
    let mut previous_keys = Vec::with_capacity(wire.previous_keys.len());
    for h in &wire.previous_keys {
        previous_keys.push(HistoricalKey {
            key_version: h.key_version,
            ciphertext: decode(&h.ciphertext_b64)?,
            nonce: nonce_array(decode(&h.nonce_b64)?)?,
            rotated_at: chrono::Utc::now(),
            rotated_reason: "rotated on server before this client observed it".into(),
            algorithm: vault_crypto::ENCRYPTION_VERSION.to_string(),
        });
    }
    Ok(EncryptedKey {
        key_version: wire.key_version,
        ciphertext: decode(&wire.ciphertext_b64)?,
        nonce: nonce_array(decode(&wire.nonce_b64)?)?,
        previous_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_current_and_historical_keys() {
        let key = EncryptedKey {
            key_version: 2,
            ciphertext: vec![1, 2, 3, 4],
            nonce: [9u8; vault_crypto::NONCE_BYTES],
            previous_keys: vec![HistoricalKey {
                key_version: 1,
                ciphertext: vec![5, 6],
                nonce: [3u8; vault_crypto::NONCE_BYTES],
                rotated_at: chrono::Utc::now(),
                rotated_reason: "test".into(),
                algorithm: "xchacha20poly1305".into(),
            }],
        };

        let wire = to_wire(&key);
        let back = from_wire(&wire).unwrap();
        assert_eq!(back.key_version, key.key_version);
        assert_eq!(back.ciphertext, key.ciphertext);
        assert_eq!(back.nonce, key.nonce);
        assert_eq!(back.previous_keys.len(), 1);
        assert_eq!(back.previous_keys[0].ciphertext, vec![5, 6]);
    }
}
