//! # vault-store
//!
//! Local File Store (spec §4.3): transactional metadata persistence plus the
//! three on-disk payload modes (`encrypted_only`, `decrypted_only`,
//! `hybrid`), and the `lock`/`unlock` state transitions between them.

mod error;
mod ops;
mod storage;
mod transaction;
mod types;

pub use error::StoreError;
pub use ops::LocalFileStore;
pub use storage::{FileMetadataStore, InMemoryMetadataStore, MetadataStore};
pub use transaction::Transaction;
pub use types::{FileMetadata, FileRecord, FileState, StorageMode, SyncStatus};
