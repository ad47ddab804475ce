//! Server-side File Record (spec.md §3.1) and the permission/state vocabulary
//! the Registry enforces.
//!
//! The Registry never decodes `encrypted_*` fields — they travel as opaque
//! base64 strings end to end (invariant 1), so this crate has no dependency
//! on `vault-crypto`/`vault-keys` at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `permission` required for an operation, checked against collection
/// membership before any side effect (§4.4 Access control).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    /// `true` if a grant of `self` satisfies a requirement of `required`.
    pub fn satisfies(self, required: Permission) -> bool {
        match required {
            Permission::ReadOnly => true,
            Permission::ReadWrite => self == Permission::ReadWrite,
        }
    }
}

/// Server-visible lifecycle state (§3.2 invariant 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Active,
    Archived,
    Deleted,
}

impl FileState {
    /// The DAG of §3.2 invariant 4: `pending -> active`, `active ->
    /// archived`, `active -> deleted`, `archived -> active`, `archived ->
    /// deleted`. Any other transition fails.
    pub fn can_transition_to(self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Archived) | (Active, Deleted) | (Archived, Active) | (Archived, Deleted)
        )
    }
}

/// One historical wrapping of the file key, opaque to the server (mirrors
/// `vault-keys::HistoricalKey`'s wire shape without linking that crate).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedFileKeyHistory {
    pub key_version: u32,
    pub ciphertext_b64: String,
    pub nonce_b64: String,
}

/// `encrypted_file_key` (§3.1): ciphertext + nonce + key_version, plus
/// `previous_keys` mirroring the collection's rotation history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedFileKey {
    pub key_version: u32,
    pub ciphertext_b64: String,
    pub nonce_b64: String,
    #[serde(default)]
    pub previous_keys: Vec<EncryptedFileKeyHistory>,
}

/// The canonical server-side File Record (§3.1), minus the client-only
/// fields (`sync_status`, `storage_mode`, local paths, cached plaintext
/// name/mime) which never leave the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileRecord {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub created_by: String,
    pub modified_by: String,

    pub encrypted_metadata: String,
    pub encrypted_file_key: EncryptedFileKey,
    pub encryption_version: String,
    pub encrypted_hash: String,

    pub encrypted_file_object_key: String,
    pub encrypted_file_size: Option<u64>,
    pub encrypted_thumbnail_object_key: Option<String>,
    pub encrypted_thumbnail_size: Option<u64>,

    pub state: FileState,
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One entry of the change feed (§4.4 Change feed).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeFeedEntry {
    pub id: String,
    pub version: u64,
    pub modified_at: DateTime<Utc>,
    pub state: FileState,
    pub record: ServerFileRecord,
}

/// Opaque pagination cursor: `(modified_at, id)` ordering (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_modified: DateTime<Utc>,
    pub last_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dag_allows_only_spec_transitions() {
        assert!(FileState::Pending.can_transition_to(FileState::Active));
        assert!(FileState::Active.can_transition_to(FileState::Archived));
        assert!(FileState::Active.can_transition_to(FileState::Deleted));
        assert!(FileState::Archived.can_transition_to(FileState::Active));
        assert!(FileState::Archived.can_transition_to(FileState::Deleted));

        assert!(!FileState::Pending.can_transition_to(FileState::Archived));
        assert!(!FileState::Deleted.can_transition_to(FileState::Active));
        assert!(!FileState::Pending.can_transition_to(FileState::Deleted));
    }

    #[test]
    fn read_write_satisfies_read_only_requirement() {
        assert!(Permission::ReadWrite.satisfies(Permission::ReadOnly));
        assert!(Permission::ReadOnly.satisfies(Permission::ReadOnly));
        assert!(!Permission::ReadOnly.satisfies(Permission::ReadWrite));
    }
}
