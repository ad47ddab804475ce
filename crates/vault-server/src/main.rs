//! CryptVault Server File Registry
//!
//! Serves the wire-level endpoints of spec.md §6.1 over JSON/HTTPS-capable
//! HTTP (TLS termination is assumed to happen in front of this process, per
//! spec.md §1's framing of transport as an external collaborator).
//!
//! Configuration (environment variables):
//!   VAULT_PORT              - Listen port (default: 8080)
//!   VAULT_DATA_DIR           - Reserved for a persistent `RegistryDb`/
//!                              `ObjectStore` backend (default: ./vault-data;
//!                              unused by the in-memory reference backends)
//!   VAULT_CAPABILITY_KEY_HEX - 64 hex chars sealing presigned-URL capability
//!                              tokens (§4.4); a random key is generated and
//!                              logged once if unset (dev only — a restart
//!                              invalidates all outstanding presigned URLs)
//!   VAULT_LOG_FORMAT         - "json" for structured logging, "pretty" for dev
//!   VAULT_RATE_LIMIT_RPS     - Requests per second per IP (default: 50)
//!   VAULT_RATE_LIMIT_BURST   - Burst capacity per IP (default: 100)
//!   VAULT_PENDING_GC_HOURS   - Horizon past which an uncompleted pending
//!                              upload is reaped (default: 24, per §8.3)
//!   VAULT_TOMBSTONE_GC_HOURS - Retention for `deleted`-state tombstones in
//!                              the change feed before they are reaped
//!                              (default: 168 = 7 days, per §4.4)
//!   VAULT_PUBLIC_URL         - Base URL this process is externally reachable
//!                              at (default: http://127.0.0.1:<port>); the
//!                              in-memory `ObjectStore`'s presigned URLs are
//!                              built against it, since it has no real
//!                              S3/B2 endpoint of its own to sign

use std::net::SocketAddr;
use std::sync::Arc;

use vault_server::{build_router, build_state, InMemoryAccessControl, InMemoryObjectStore, InMemoryRegistryDb};

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn capability_key() -> [u8; 32] {
    match std::env::var("VAULT_CAPABILITY_KEY_HEX") {
        Ok(hex_key) => {
            let bytes = hex::decode(hex_key.trim()).expect("VAULT_CAPABILITY_KEY_HEX must be 64 hex chars");
            bytes.try_into().expect("VAULT_CAPABILITY_KEY_HEX must decode to exactly 32 bytes")
        }
        Err(_) => {
            let key = vault_crypto::random_bytes::<32>().expect("failed to generate capability key");
            tracing::warn!(
                "VAULT_CAPABILITY_KEY_HEX not set; generated an ephemeral capability key. \
                 Outstanding presigned URLs will not survive a restart."
            );
            key
        }
    }
}

#[tokio::main]
async fn main() {
    let log_format = std::env::var("VAULT_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vault_server=info,tower_http=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).with_target(true).with_thread_ids(true).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let port = env_u16("VAULT_PORT", 8080);
    let data_dir = std::env::var("VAULT_DATA_DIR").unwrap_or_else(|_| "./vault-data".into());
    let rate_rps = env_f64("VAULT_RATE_LIMIT_RPS", 50.0);
    let rate_burst = env_u32("VAULT_RATE_LIMIT_BURST", 100);
    let pending_gc_hours = env_u32("VAULT_PENDING_GC_HOURS", 24);
    let tombstone_gc_hours = env_u32("VAULT_TOMBSTONE_GC_HOURS", 168);

    let public_url =
        std::env::var("VAULT_PUBLIC_URL").unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));

    let db = Arc::new(InMemoryRegistryDb::new());
    let objects = Arc::new(InMemoryObjectStore::new(capability_key(), public_url.clone()));
    let access = Arc::new(InMemoryAccessControl::new());

    let state = build_state(db, objects, access, rate_rps, rate_burst);

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweep_state.sweep_rate_limiter().await;
        }
    });

    let gc_state = state.clone();
    let pending_horizon = chrono::Duration::hours(pending_gc_hours as i64);
    let tombstone_retention = chrono::Duration::hours(tombstone_gc_hours as i64);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            gc_state.sweep_gc(pending_horizon, tombstone_retention).await;
        }
    });

    let app = build_router(state);

    tracing::info!(port, rate_rps, rate_burst, public_url = %public_url, "starting CryptVault server file registry");
    tracing::info!(data_dir = %data_dir, "data directory (unused by in-memory reference backends)");

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("invalid listen address");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listen address");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server exited unexpectedly");
}
