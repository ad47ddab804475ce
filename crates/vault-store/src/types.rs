//! Client-side file record and the plaintext metadata blob it wraps
//! (spec.md §3.1 File Record / File Metadata Blob).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_keys::EncryptedKey;

/// `storage_mode` (§4.3): which on-disk representations exist for a file's
/// payload. Exactly one variant ever applies to a given record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Only the `.encrypted` path exists.
    EncryptedOnly,
    /// Only the plaintext path exists; the payload is not recoverable from
    /// disk alone (the file key remains wrapped in the record).
    DecryptedOnly,
    /// Both paths exist; the encrypted path is authoritative for integrity.
    Hybrid,
}

/// Client-local sync tag (§4.5), distinct from the server's `state`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    LocalOnly,
    CloudOnly,
    Synced,
    ModifiedLocally,
}

/// Server-visible lifecycle state (§3.2 invariant 4). Transitions are
/// enforced by `vault-server`, not here; the store only records the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Active,
    Archived,
    Deleted,
}

/// Plaintext metadata blob (§3.1), client-only cache, never persisted
/// server-side — only its encrypted form (`encrypted_metadata`) is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub decrypted_file_path: Option<PathBuf>,
    pub decrypted_file_size: Option<u64>,
    pub encrypted_file_path: Option<PathBuf>,
    pub encrypted_file_size: Option<u64>,
    pub thumbnail_name: Option<String>,
    pub thumbnail_size: Option<u64>,
}

/// The File Record (§3.1). Fields prefixed `encrypted_` are opaque
/// ciphertext (base64-encoded nonce‖ciphertext) and MUST NEVER be decoded
/// except by the Key Hierarchy Service (invariant 1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub created_by: String,
    pub modified_by: String,

    pub encrypted_metadata: String,
    pub encrypted_file_key: EncryptedKey,
    pub encryption_version: String,
    pub encrypted_hash: String,

    pub encrypted_file_object_key: Option<String>,
    pub encrypted_file_size: Option<u64>,
    pub encrypted_thumbnail_object_key: Option<String>,
    pub encrypted_thumbnail_size: Option<u64>,

    pub state: FileState,
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    // Client-only fields, never sent to or received verbatim from the wire.
    pub sync_status: SyncStatus,
    pub storage_mode: StorageMode,
    pub decrypted_path: Option<PathBuf>,
    pub encrypted_path: Option<PathBuf>,
    pub cached_name: Option<String>,
    pub cached_mime_type: Option<String>,
}
