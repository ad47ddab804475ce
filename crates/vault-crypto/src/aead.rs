//! AEAD: XChaCha20-Poly1305 ("ChaCha20-Poly1305-IETF" extended-nonce
//! secretbox-style construction, §4.1).

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::{AuthError, CryptoError};
use crate::random::random_bytes;

pub const KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 24;
pub const TAG_BYTES: usize = 16;

/// Result of a single seal operation.
pub struct Sealed {
    pub nonce: [u8; NONCE_BYTES],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` under `key` with a freshly generated random nonce.
/// Associated data is empty in `encryption_version = "1.0"` per §4.1.
pub fn aead_encrypt(plaintext: &[u8], key: &[u8; KEY_BYTES]) -> Result<Sealed, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = random_bytes::<NONCE_BYTES>()?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .map_err(|_| CryptoError::Format("aead seal failed"))?;

    Ok(Sealed { nonce: nonce_bytes, ciphertext })
}

/// Decrypt `ciphertext` (tag-appended, as produced by [`aead_encrypt`])
/// under `key` and `nonce`. Authentication failure is unrecoverable for this
/// operation (§4.1) and is surfaced uniformly as [`AuthError`] regardless of
/// whether the key, nonce, or ciphertext bytes were wrong.
pub fn aead_decrypt(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_BYTES],
    key: &[u8; KEY_BYTES],
) -> Result<Vec<u8>, AuthError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
        .map_err(|_| AuthError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [1u8; KEY_BYTES];
        let sealed = aead_encrypt(b"hello vault", &key).unwrap();
        let opened = aead_decrypt(&sealed.ciphertext, &sealed.nonce, &key).unwrap();
        assert_eq!(opened, b"hello vault");
    }

    #[test]
    fn wrong_key_fails_uniformly() {
        let key = [1u8; KEY_BYTES];
        let other = [2u8; KEY_BYTES];
        let sealed = aead_encrypt(b"hello vault", &key).unwrap();
        let err = aead_decrypt(&sealed.ciphertext, &sealed.nonce, &other).unwrap_err();
        assert_eq!(err, AuthError);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [1u8; KEY_BYTES];
        let mut sealed = aead_encrypt(b"hello vault", &key).unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0xFF;
        assert!(aead_decrypt(&sealed.ciphertext, &sealed.nonce, &key).is_err());
    }

    #[test]
    fn fresh_nonce_each_call() {
        let key = [3u8; KEY_BYTES];
        let a = aead_encrypt(b"same plaintext", &key).unwrap();
        let b = aead_encrypt(b"same plaintext", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
