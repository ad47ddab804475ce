//! Wrapped-key representations shared by the hierarchy operations.
//!
//! These are deliberately decoupled from the on-disk/wire record shapes
//! owned by `vault-store` and `vault-server`: this crate only needs the
//! ciphertext/nonce/version triple, not the rest of a `User`/`Collection`
//! record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_crypto::NONCE_BYTES;

/// One historical wrapping of a key, retained so files/collections encrypted
/// under a since-rotated key remain decryptable (§3.1 Collection, §4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoricalKey {
    pub key_version: u32,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_BYTES],
    pub rotated_at: DateTime<Utc>,
    pub rotated_reason: String,
    pub algorithm: String,
}

/// A key wrapped (encrypted) under some parent key, plus enough history to
/// recover it after the parent key has been rotated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub key_version: u32,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_BYTES],
    #[serde(default)]
    pub previous_keys: Vec<HistoricalKey>,
}

impl EncryptedKey {
    /// Wrap `plaintext` freshly, with no rotation history yet.
    pub fn seal(
        plaintext: &[u8; 32],
        wrapping_key: &[u8; 32],
        key_version: u32,
    ) -> Result<Self, vault_crypto::CryptoError> {
        let sealed = vault_crypto::aead_encrypt(plaintext, wrapping_key)?;
        Ok(Self {
            key_version,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            previous_keys: Vec::new(),
        })
    }

    /// All (version, ciphertext, nonce) candidates to try when decrypting,
    /// current version first, then `previous_keys` in descending version
    /// order (§4.2: "try `previous_keys` in descending order").
    pub(crate) fn candidates(&self) -> Vec<(u32, &[u8], &[u8; NONCE_BYTES])> {
        let mut out = vec![(self.key_version, self.ciphertext.as_slice(), &self.nonce)];
        let mut historical: Vec<_> = self
            .previous_keys
            .iter()
            .map(|h| (h.key_version, h.ciphertext.as_slice(), &h.nonce))
            .collect();
        historical.sort_by(|a, b| b.0.cmp(&a.0));
        out.extend(historical);
        out
    }
}

/// Minimal view of a user needed to recover the master key (§3.1 User).
pub struct UserKeyMaterial {
    pub password_salt: Vec<u8>,
    pub encrypted_master_key: EncryptedKey,
    pub encryption_version: String,
}

/// Minimal view of a collection needed to recover the collection key
/// (§3.1 Collection).
pub struct CollectionKeyMaterial {
    pub encrypted_collection_key: EncryptedKey,
}
