//! Error taxonomy for the Sync Engine (spec.md §7 kinds this component can
//! raise, plus `PartialFailure` which only the Sync Engine's delete paths
//! produce).

use vault_keys::KeyError;
use vault_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("incorrect password")]
    CryptoAuth,

    #[error("malformed ciphertext framing: {0}")]
    CryptoFormat(String),

    #[error("local I/O error: {0}")]
    IoLocal(#[from] std::io::Error),

    #[error("object/network I/O error: {0}")]
    IoObject(String),

    /// The server reported a `version` for this file that is not strictly
    /// greater than the one the client already holds, or a concurrent
    /// writer otherwise lost a compare-and-set race (§3.2 invariant 5).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An operation touching both local and cloud state succeeded on one
    /// side but not the other (§4.5 full delete).
    #[error("partial failure: {0}")]
    PartialFailure(String),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(m) => SyncError::Validation(m),
            StoreError::NotFound(m) => SyncError::NotFound(m),
            StoreError::StateViolation(m) => SyncError::StateViolation(m),
            StoreError::CryptoAuth => SyncError::CryptoAuth,
            StoreError::CryptoFormat(m) => SyncError::CryptoFormat(m.to_string()),
            StoreError::Io(e) => SyncError::IoLocal(e),
            StoreError::Serialization(e) => SyncError::Validation(e.to_string()),
        }
    }
}

impl From<KeyError> for SyncError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::IncorrectPassword => SyncError::CryptoAuth,
            KeyError::Malformed(m) => SyncError::CryptoFormat(m.to_string()),
            KeyError::NoMatchingKeyVersion => SyncError::CryptoFormat("no key version could decrypt this file".into()),
            KeyError::Rng => SyncError::Validation("random number generation failed".into()),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::IoObject(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Validation(format!("malformed JSON: {e}"))
    }
}
