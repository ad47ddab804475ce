//! # vault-server
//!
//! The Server File Registry (spec §4.4): the two-phase upload protocol,
//! presigned-URL issuance, per-collection access control, and the
//! cursor-based change feed, plus the `axum` HTTP surface (§6.1) that
//! exposes them over JSON.

pub mod access;
pub mod error;
pub mod http;
pub mod object_store;
pub mod presign;
mod rate_limit;
pub mod registry;
pub mod registry_db;
pub mod types;

pub use access::{AccessControl, InMemoryAccessControl};
pub use error::RegistryError;
pub use http::{build_router, build_state, AppState, Shared};
pub use object_store::{InMemoryObjectStore, ObjectStore, PresignedUrl};
pub use registry::{NewFileRequest, Registry, DEFAULT_UPLOAD_TTL};
pub use registry_db::{InMemoryRegistryDb, RegistryDb};
pub use types::{
    ChangeFeedEntry, Cursor, EncryptedFileKey, EncryptedFileKeyHistory, FileState, Permission, ServerFileRecord,
};
