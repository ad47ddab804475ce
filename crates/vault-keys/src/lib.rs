//! # vault-keys
//!
//! Key Hierarchy Service (spec §4.2): recovers the Master Key, Collection
//! Keys, and File Keys from their AEAD-wrapped, versioned representations.
//! Builds directly on [`vault_crypto`] and never touches a cipher or the KDF
//! itself — all primitive operations are delegated there.

mod error;
mod hierarchy;
mod types;

pub use error::KeyError;
pub use hierarchy::{decrypt_collection_key_chain, decrypt_file_key};
pub use types::{CollectionKeyMaterial, EncryptedKey, HistoricalKey, UserKeyMaterial};

pub use vault_crypto::Secret32;
