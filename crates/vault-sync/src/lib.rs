//! # vault-sync
//!
//! Sync Engine (spec §4.5): reconciles local and server state via a
//! cursor-based incremental sync, the per-file `sync_status` state machine,
//! and the onload/offload pair that moves payloads between local disk and
//! object storage while preserving the encryption envelope end to end.

mod client;
mod engine;
mod error;
mod wire;

pub use client::{CreatePendingResponse, DownloadUrlsResponse, PresignedUrlDto, ServerClient};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use wire::{from_wire, to_wire};
