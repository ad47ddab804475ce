//! Error taxonomy for the Local File Store (maps onto spec.md §7's kinds
//! that this component can raise: `Validation`, `NotFound`,
//! `StateViolation`, `Crypto::Auth`, `Crypto::Format`, `IO::Local`).

use vault_crypto::{AuthError, CryptoError, FormatError};
use vault_keys::KeyError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("file record not found: {0}")]
    NotFound(String),

    /// Attempted an operation whose precondition on `sync_status` or
    /// `storage_mode` was not met (e.g. `delete_local` on a non-`local_only`
    /// file, `lock`/`unlock` on a `cloud_only` file).
    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("incorrect password")]
    CryptoAuth,

    #[error("malformed ciphertext framing: {0}")]
    CryptoFormat(&'static str),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CryptoError> for StoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Auth => StoreError::CryptoAuth,
            CryptoError::Format(msg) => StoreError::CryptoFormat(msg),
            CryptoError::Rng => StoreError::Validation("random number generation failed".into()),
        }
    }
}

impl From<AuthError> for StoreError {
    fn from(_: AuthError) -> Self {
        StoreError::CryptoAuth
    }
}

impl From<FormatError> for StoreError {
    fn from(e: FormatError) -> Self {
        StoreError::CryptoFormat(e.0)
    }
}

impl From<KeyError> for StoreError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::IncorrectPassword => StoreError::CryptoAuth,
            KeyError::Malformed(msg) => StoreError::CryptoFormat(msg),
            KeyError::NoMatchingKeyVersion => {
                StoreError::CryptoFormat("no key version could decrypt this file")
            }
            KeyError::Rng => StoreError::Validation("random number generation failed".into()),
        }
    }
}
