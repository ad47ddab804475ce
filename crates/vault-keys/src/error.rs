//! Error types for the key hierarchy service.

use vault_crypto::CryptoError;

/// Errors surfaced by [`crate::hierarchy`] operations.
///
/// Per spec.md §7, a wrong password and "user does not exist" must be
/// indistinguishable: both collapse to [`KeyError::IncorrectPassword`].
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The KEK derived from the supplied password could not open the
    /// user's master key (or a downstream key in the chain). Reported
    /// uniformly as "incorrect password" — never "user not found".
    #[error("incorrect password")]
    IncorrectPassword,

    /// An `EncryptedKey`'s ciphertext/nonce framing was malformed, or no
    /// key version (current or historical) could decrypt the target.
    #[error("malformed key material: {0}")]
    Malformed(&'static str),

    /// Every key version, including all of `previous_keys`, failed to
    /// decrypt. Distinct from `IncorrectPassword` because this occurs
    /// further down the chain (file key vs. master key) and always implies
    /// the wrapping key itself was already correctly recovered.
    #[error("no key version could decrypt this ciphertext")]
    NoMatchingKeyVersion,

    #[error("rng failure")]
    Rng,
}

impl From<CryptoError> for KeyError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Auth => KeyError::IncorrectPassword,
            CryptoError::Format(msg) => KeyError::Malformed(msg),
            CryptoError::Rng => KeyError::Rng,
        }
    }
}
