//! The HTTP surface (§6.1, §4.D): an `axum` `Router` exposing the Server
//! File Registry's wire-level endpoints over JSON, with a rate-limiting
//! layer and a session-identity middleware in front of it.
//!
//! Session/credential issuance is an external collaborator (spec.md §1);
//! this layer only requires that *some* identity accompany a request
//! (`Authorization: Bearer <user_id>`) and hands that identity to the
//! [`Registry`] as `user_id`, which enforces the real access-control
//! decision (§4.4).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::AccessControl;
use crate::error::RegistryError;
use crate::object_store::{ObjectStore, PresignedUrl};
use crate::registry::{NewFileRequest, Registry};
use crate::registry_db::RegistryDb;
use crate::rate_limit::RateLimiter;
use crate::types::{ChangeFeedEntry, Cursor, EncryptedFileKey, ServerFileRecord};

pub struct AppState {
    pub registry: Registry,
    pub objects: Arc<dyn ObjectStore>,
    rate_limiter: RateLimiter,
}

pub type Shared = Arc<AppState>;

impl AppState {
    /// Drop rate-limiter buckets idle for 5+ minutes. Intended to be called
    /// periodically by the server binary (see `main.rs`).
    pub async fn sweep_rate_limiter(&self) {
        self.rate_limiter.sweep_idle().await;
    }

    /// Reap stale pending records and deleted-state tombstones (§4.4, §8.3).
    /// Intended to be called periodically by the server binary (see
    /// `main.rs`); errors are logged, not propagated, since a failed sweep
    /// should not bring down the process.
    pub async fn sweep_gc(&self, pending_horizon: Duration, tombstone_retention: Duration) {
        if let Err(err) = self.registry.gc(pending_horizon, tombstone_retention).await {
            tracing::warn!(%err, "registry gc sweep failed");
        }
    }
}

pub fn build_state(
    db: Arc<dyn RegistryDb>,
    objects: Arc<dyn ObjectStore>,
    access: Arc<dyn AccessControl>,
    rate_rps: f64,
    rate_burst: u32,
) -> Shared {
    Arc::new(AppState {
        registry: Registry::new(db, objects.clone(), access),
        objects,
        rate_limiter: RateLimiter::new(rate_rps, rate_burst),
    })
}

/// The object-store half of the API: out-of-band `PUT`/`GET` against a
/// presigned URL. The reference [`crate::object_store::InMemoryObjectStore`]
/// seals `object_key` into an opaque token rather than handing out a real
/// S3/B2 URL, so these routes exist to give that token somewhere to resolve
/// against in a local deployment (`examples/Lantern-chat-yab2`'s
/// direct-PUT shape, minus an external bucket).
pub fn build_router(state: Shared) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/files", post(create_pending))
        .route("/files/:id", get(get_file))
        .route("/files/:id/complete", post(complete))
        .route("/files/:id/download-urls", get(download_urls))
        .route("/files/:id/reupload-url", post(reupload_url))
        .route("/files/:id/update", post(update_file))
        .route("/files/:id/archive", post(archive))
        .route("/files/:id", axum::routing::delete(delete_file))
        .route("/collections/:cid/files/sync", get(change_feed))
        .route("/objects/upload/:token", axum::routing::put(upload_object))
        .route("/objects/download/:token", get(download_object))
        .layer(middleware::from_fn(auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Session identity + rate limiting middleware
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct UserId(String);

async fn auth_middleware(mut req: Request, next: Next) -> impl IntoResponse {
    if req.uri().path() == "/health" || req.uri().path().starts_with("/objects/") {
        return next.run(req).await.into_response();
    }

    let user_id = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    match user_id {
        Some(id) if !id.is_empty() => {
            req.extensions_mut().insert(UserId(id));
            next.run(req).await.into_response()
        }
        _ => RegistryError::Authentication.into_response(),
    }
}

async fn rate_limit_middleware(
    State(state): State<Shared>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    if req.uri().path() == "/health" {
        return next.run(req).await.into_response();
    }
    if !state.rate_limiter.check(addr.ip()).await {
        tracing::warn!(ip = %addr.ip(), path = %req.uri().path(), "rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "1")]).into_response();
    }
    next.run(req).await.into_response()
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateFileRequest {
    collection_id: String,
    owner_id: String,
    encrypted_metadata: String,
    encrypted_file_key: EncryptedFileKey,
    encryption_version: String,
    encrypted_hash: String,
    #[serde(default)]
    wants_thumbnail: bool,
}

#[derive(Serialize)]
struct PresignedUrlDto {
    url: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<PresignedUrl> for PresignedUrlDto {
    fn from(p: PresignedUrl) -> Self {
        Self { url: p.url, expires_at: p.expires_at }
    }
}

#[derive(Serialize)]
struct CreatePendingResponse {
    file: ServerFileRecord,
    presigned_upload_url: PresignedUrlDto,
    presigned_thumbnail_upload_url: Option<PresignedUrlDto>,
    expiration: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize, Default)]
struct CompleteRequest {
    reported_size: Option<u64>,
}

#[derive(Deserialize)]
struct DownloadUrlsQuery {
    ttl: Option<i64>,
}

#[derive(Serialize)]
struct DownloadUrlsResponse {
    presigned_download_url: PresignedUrlDto,
    presigned_thumbnail_download_url: Option<PresignedUrlDto>,
    expiration: chrono::DateTime<chrono::Utc>,
    file: ServerFileRecord,
}

#[derive(Serialize)]
struct ReuploadUrlResponse {
    presigned_upload_url: PresignedUrlDto,
    expiration: chrono::DateTime<chrono::Utc>,
    file: ServerFileRecord,
}

#[derive(Deserialize)]
struct UpdateFileRequest {
    encrypted_metadata: String,
    encrypted_hash: String,
    reported_size: Option<u64>,
}

#[derive(Deserialize)]
struct ChangeFeedQuery {
    cursor: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ChangeFeedResponse {
    entries: Vec<ChangeFeedEntry>,
    next_cursor: Option<String>,
}

const DEFAULT_CHANGE_FEED_LIMIT: usize = 100;

fn encode_cursor(cursor: &Cursor) -> Result<String, RegistryError> {
    serde_json::to_string(cursor)
        .map(|s| base64_url(&s))
        .map_err(|e| RegistryError::Validation(format!("cursor encoding failed: {e}")))
}

fn decode_cursor(raw: &str) -> Result<Cursor, RegistryError> {
    let json = base64_url_decode(raw).map_err(|_| RegistryError::Validation("malformed cursor".into()))?;
    serde_json::from_slice(&json).map_err(|_| RegistryError::Validation("malformed cursor".into()))
}

fn base64_url(s: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(s.as_bytes())
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, ()> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.decode(s).map_err(|_| ())
}

// ---------------------------------------------------------------------------
// Handlers — §6.1
// ---------------------------------------------------------------------------

async fn create_pending(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Json(body): Json<CreateFileRequest>,
) -> Result<Json<CreatePendingResponse>, RegistryError> {
    let req = NewFileRequest {
        collection_id: body.collection_id,
        owner_id: body.owner_id,
        created_by: user_id.clone(),
        encrypted_metadata: body.encrypted_metadata,
        encrypted_file_key: body.encrypted_file_key,
        encryption_version: body.encryption_version,
        encrypted_hash: body.encrypted_hash,
        wants_thumbnail: body.wants_thumbnail,
    };
    let (file, upload_url, thumb_url) = state.registry.create_pending(&user_id, req).await?;
    let expiration = upload_url.expires_at;
    Ok(Json(CreatePendingResponse {
        file,
        presigned_upload_url: upload_url.into(),
        presigned_thumbnail_upload_url: thumb_url.map(Into::into),
        expiration,
    }))
}

async fn get_file(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<ServerFileRecord>, RegistryError> {
    Ok(Json(state.registry.get(&user_id, &id).await?))
}

async fn complete(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<ServerFileRecord>, RegistryError> {
    Ok(Json(state.registry.complete(&user_id, &id, body.reported_size).await?))
}

async fn download_urls(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
    Query(query): Query<DownloadUrlsQuery>,
) -> Result<Json<DownloadUrlsResponse>, RegistryError> {
    let ttl = Duration::seconds(query.ttl.unwrap_or(3600));
    let (download_url, thumb_url, file) = state.registry.download_urls(&user_id, &id, ttl).await?;
    let expiration = download_url.expires_at;
    Ok(Json(DownloadUrlsResponse {
        presigned_download_url: download_url.into(),
        presigned_thumbnail_download_url: thumb_url.map(Into::into),
        expiration,
        file,
    }))
}

async fn reupload_url(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
    Query(query): Query<DownloadUrlsQuery>,
) -> Result<Json<ReuploadUrlResponse>, RegistryError> {
    let ttl = Duration::seconds(query.ttl.unwrap_or(3600));
    let (upload_url, file) = state.registry.reupload_url(&user_id, &id, ttl).await?;
    let expiration = upload_url.expires_at;
    Ok(Json(ReuploadUrlResponse { presigned_upload_url: upload_url.into(), expiration, file }))
}

async fn update_file(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
    Json(body): Json<UpdateFileRequest>,
) -> Result<Json<ServerFileRecord>, RegistryError> {
    let record = state
        .registry
        .update(&user_id, &id, body.encrypted_metadata, body.encrypted_hash, body.reported_size)
        .await?;
    Ok(Json(record))
}

async fn archive(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<ServerFileRecord>, RegistryError> {
    Ok(Json(state.registry.archive(&user_id, &id).await?))
}

async fn delete_file(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(id): Path<String>,
) -> Result<StatusCode, RegistryError> {
    state.registry.delete(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_feed(
    State(state): State<Shared>,
    axum::extract::Extension(UserId(user_id)): axum::extract::Extension<UserId>,
    Path(cid): Path<String>,
    Query(query): Query<ChangeFeedQuery>,
) -> Result<Json<ChangeFeedResponse>, RegistryError> {
    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_CHANGE_FEED_LIMIT);
    let (entries, next_cursor) = state.registry.change_feed(&user_id, &cid, cursor, limit).await?;
    let next_cursor = next_cursor.as_ref().map(encode_cursor).transpose()?;
    Ok(Json(ChangeFeedResponse { entries, next_cursor }))
}

// ---------------------------------------------------------------------------
// Object-storage proxy routes (local-deployment-only; see `build_router`)
// ---------------------------------------------------------------------------

async fn upload_object(
    State(state): State<Shared>,
    Path(token): Path<String>,
    body: axum::body::Bytes,
) -> Result<StatusCode, RegistryError> {
    let object_key = state.objects.resolve_token(&token)?;
    state.objects.put(&object_key, &body)?;
    Ok(StatusCode::OK)
}

async fn download_object(
    State(state): State<Shared>,
    Path(token): Path<String>,
) -> Result<Vec<u8>, RegistryError> {
    let object_key = state.objects.resolve_token(&token)?;
    state.objects.get(&object_key)
}
