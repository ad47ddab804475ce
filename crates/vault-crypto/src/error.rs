//! Unified error types for `vault-crypto`.

use core::fmt;

/// Authenticated-encryption failure. Deliberately carries no detail: the
/// spec (§7) requires that wrong-password and tampered-ciphertext failures
/// be indistinguishable from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthError;

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed")
    }
}

impl std::error::Error for AuthError {}

/// Ciphertext or key material was malformed before authentication could
/// even be attempted (wrong lengths, bad framing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatError(pub &'static str);

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed ciphertext: {}", self.0)
    }
}

impl std::error::Error for FormatError {}

/// Top-level crypto error, matching the `Crypto::Auth` / `Crypto::Format`
/// split of spec.md §7.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("authentication failed")]
    Auth,
    #[error("malformed ciphertext: {0}")]
    Format(&'static str),
    #[error("random number generation failed")]
    Rng,
}

impl From<AuthError> for CryptoError {
    fn from(_: AuthError) -> Self {
        CryptoError::Auth
    }
}

impl From<FormatError> for CryptoError {
    fn from(e: FormatError) -> Self {
        CryptoError::Format(e.0)
    }
}
