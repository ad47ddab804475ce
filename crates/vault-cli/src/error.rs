//! Crate-wide error type (§3.A of the design notes) unifying
//! `vault-store`/`vault-keys`/`vault-sync` errors into the exit-code
//! taxonomy of spec.md §6.4/§7.

use std::fmt;

use vault_keys::KeyError;
use vault_store::StoreError;
use vault_sync::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultErrorKind {
    Validation,
    Forbidden,
    NotFound,
    StateViolation,
    Conflict,
    CryptoAuth,
    CryptoFormat,
    IoLocal,
    IoObject,
    PartialFailure,
}

impl VaultErrorKind {
    /// Exit codes per spec.md §6.4: `0` success, `1` user error, `2` not
    /// found, `3` conflict/state violation, `4` crypto/auth failure, `5`
    /// I/O failure.
    pub fn exit_code(self) -> i32 {
        match self {
            VaultErrorKind::Validation | VaultErrorKind::Forbidden => 1,
            VaultErrorKind::NotFound => 2,
            VaultErrorKind::StateViolation | VaultErrorKind::Conflict => 3,
            VaultErrorKind::CryptoAuth | VaultErrorKind::CryptoFormat => 4,
            VaultErrorKind::IoLocal | VaultErrorKind::IoObject | VaultErrorKind::PartialFailure => 5,
        }
    }
}

#[derive(Debug)]
pub struct VaultError {
    pub kind: VaultErrorKind,
    message: String,
}

impl VaultError {
    pub fn new(kind: VaultErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VaultError {}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        let kind = match &e {
            StoreError::Validation(_) => VaultErrorKind::Validation,
            StoreError::NotFound(_) => VaultErrorKind::NotFound,
            StoreError::StateViolation(_) => VaultErrorKind::StateViolation,
            StoreError::CryptoAuth => VaultErrorKind::CryptoAuth,
            StoreError::CryptoFormat(_) => VaultErrorKind::CryptoFormat,
            StoreError::Io(_) => VaultErrorKind::IoLocal,
            StoreError::Serialization(_) => VaultErrorKind::Validation,
        };
        VaultError::new(kind, e.to_string())
    }
}

impl From<KeyError> for VaultError {
    fn from(e: KeyError) -> Self {
        let kind = match &e {
            KeyError::IncorrectPassword => VaultErrorKind::CryptoAuth,
            KeyError::Malformed(_) => VaultErrorKind::CryptoFormat,
            KeyError::NoMatchingKeyVersion => VaultErrorKind::CryptoFormat,
            KeyError::Rng => VaultErrorKind::IoLocal,
        };
        VaultError::new(kind, e.to_string())
    }
}

impl From<SyncError> for VaultError {
    fn from(e: SyncError) -> Self {
        let kind = match &e {
            SyncError::Validation(_) => VaultErrorKind::Validation,
            SyncError::NotFound(_) => VaultErrorKind::NotFound,
            SyncError::Forbidden => VaultErrorKind::Forbidden,
            SyncError::StateViolation(_) => VaultErrorKind::StateViolation,
            SyncError::CryptoAuth => VaultErrorKind::CryptoAuth,
            SyncError::CryptoFormat(_) => VaultErrorKind::CryptoFormat,
            SyncError::IoLocal(_) => VaultErrorKind::IoLocal,
            SyncError::IoObject(_) => VaultErrorKind::IoObject,
            SyncError::Conflict(_) => VaultErrorKind::Conflict,
            SyncError::PartialFailure(_) => VaultErrorKind::PartialFailure,
        };
        VaultError::new(kind, e.to_string())
    }
}
