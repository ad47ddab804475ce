//! The client side of §6.1's wire protocol: a thin `reqwest` wrapper that
//! speaks the Server File Registry's JSON endpoints. This is the only part
//! of the Sync Engine that performs network I/O; `engine.rs` drives it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_server::{ChangeFeedEntry, Cursor, EncryptedFileKey, ServerFileRecord};

use crate::error::SyncError;

#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

#[derive(Serialize)]
struct CreateFileRequestBody {
    collection_id: String,
    owner_id: String,
    encrypted_metadata: String,
    encrypted_file_key: EncryptedFileKey,
    encryption_version: String,
    encrypted_hash: String,
    wants_thumbnail: bool,
}

#[derive(Clone, Deserialize)]
pub struct PresignedUrlDto {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct CreatePendingResponse {
    pub file: ServerFileRecord,
    pub presigned_upload_url: PresignedUrlDto,
    pub presigned_thumbnail_upload_url: Option<PresignedUrlDto>,
}

#[derive(Deserialize)]
pub struct DownloadUrlsResponse {
    pub presigned_download_url: PresignedUrlDto,
    pub presigned_thumbnail_download_url: Option<PresignedUrlDto>,
    pub file: ServerFileRecord,
}

#[derive(Serialize)]
struct CompleteRequestBody {
    reported_size: Option<u64>,
}

#[derive(Deserialize)]
pub struct ReuploadUrlResponse {
    pub presigned_upload_url: PresignedUrlDto,
    pub file: ServerFileRecord,
}

#[derive(Serialize)]
struct UpdateFileRequestBody {
    encrypted_metadata: String,
    encrypted_hash: String,
    reported_size: Option<u64>,
}

#[derive(Deserialize)]
struct ChangeFeedResponseBody {
    entries: Vec<ChangeFeedEntry>,
    next_cursor: Option<String>,
}

fn encode_cursor(cursor: &Cursor) -> Result<String, SyncError> {
    let json = serde_json::to_string(cursor)?;
    Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

fn decode_cursor(raw: &str) -> Result<Cursor, SyncError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| SyncError::Validation("malformed cursor".into()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn into_result<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, SyncError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp.json::<T>().await?)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            400 => SyncError::Validation(body),
            401 => SyncError::Forbidden,
            403 => SyncError::Forbidden,
            404 => SyncError::NotFound(body),
            409 => SyncError::Conflict(body),
            _ => SyncError::IoObject(format!("server returned {status}: {body}")),
        })
    }
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            user_id: user_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// §6.1 `POST /files` (create pending).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_pending(
        &self,
        collection_id: &str,
        owner_id: &str,
        encrypted_metadata: &str,
        encrypted_file_key: EncryptedFileKey,
        encryption_version: &str,
        encrypted_hash: &str,
        wants_thumbnail: bool,
    ) -> Result<CreatePendingResponse, SyncError> {
        let body = CreateFileRequestBody {
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            encrypted_metadata: encrypted_metadata.to_string(),
            encrypted_file_key,
            encryption_version: encryption_version.to_string(),
            encrypted_hash: encrypted_hash.to_string(),
            wants_thumbnail,
        };
        let resp = self
            .http
            .post(self.url("/files"))
            .bearer_auth(&self.user_id)
            .json(&body)
            .send()
            .await?;
        into_result(resp).await
    }

    /// §6.1 `PUT` against a presigned upload URL — the only out-of-band
    /// transfer in this protocol (payload ciphertext never traverses the
    /// metadata channel).
    pub async fn put_object(&self, presigned_url: &str, bytes: Vec<u8>) -> Result<(), SyncError> {
        let resp = self.http.put(presigned_url).body(bytes).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::IoObject(format!("object PUT failed: {}", resp.status())))
        }
    }

    /// `GET` against a presigned download URL.
    pub async fn get_object(&self, presigned_url: &str) -> Result<Vec<u8>, SyncError> {
        let resp = self.http.get(presigned_url).send().await?;
        if resp.status().is_success() {
            Ok(resp.bytes().await?.to_vec())
        } else {
            Err(SyncError::IoObject(format!("object GET failed: {}", resp.status())))
        }
    }

    /// §6.1 `POST /files/{id}/complete`.
    pub async fn complete(&self, file_id: &str, reported_size: Option<u64>) -> Result<ServerFileRecord, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/files/{file_id}/complete")))
            .bearer_auth(&self.user_id)
            .json(&CompleteRequestBody { reported_size })
            .send()
            .await?;
        into_result(resp).await
    }

    /// §6.1 `GET /files/{id}`.
    pub async fn get(&self, file_id: &str) -> Result<ServerFileRecord, SyncError> {
        let resp = self
            .http
            .get(self.url(&format!("/files/{file_id}")))
            .bearer_auth(&self.user_id)
            .send()
            .await?;
        into_result(resp).await
    }

    /// §6.1 `GET /files/{id}/download-urls`.
    pub async fn download_urls(&self, file_id: &str, ttl_seconds: i64) -> Result<DownloadUrlsResponse, SyncError> {
        let resp = self
            .http
            .get(self.url(&format!("/files/{file_id}/download-urls?ttl={ttl_seconds}")))
            .bearer_auth(&self.user_id)
            .send()
            .await?;
        into_result(resp).await
    }

    /// A presigned upload URL for an already-`active` file's existing
    /// object key (§4.5 collection-sync step 2's `modified_locally` push).
    pub async fn reupload_url(&self, file_id: &str, ttl_seconds: i64) -> Result<ReuploadUrlResponse, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/files/{file_id}/reupload-url?ttl={ttl_seconds}")))
            .bearer_auth(&self.user_id)
            .send()
            .await?;
        into_result(resp).await
    }

    /// Re-seal an already-`active` file's envelope in place (§4.5
    /// collection-sync step 2's `modified_locally` push).
    pub async fn update(
        &self,
        file_id: &str,
        encrypted_metadata: &str,
        encrypted_hash: &str,
        reported_size: Option<u64>,
    ) -> Result<ServerFileRecord, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/files/{file_id}/update")))
            .bearer_auth(&self.user_id)
            .json(&UpdateFileRequestBody {
                encrypted_metadata: encrypted_metadata.to_string(),
                encrypted_hash: encrypted_hash.to_string(),
                reported_size,
            })
            .send()
            .await?;
        into_result(resp).await
    }

    /// §6.1 `POST /files/{id}/archive`.
    pub async fn archive(&self, file_id: &str) -> Result<ServerFileRecord, SyncError> {
        let resp = self
            .http
            .post(self.url(&format!("/files/{file_id}/archive")))
            .bearer_auth(&self.user_id)
            .send()
            .await?;
        into_result(resp).await
    }

    /// §6.1 `DELETE /files/{id}`. Treats a 404 as success: full delete
    /// (§4.5) proceeds to the local delete whether the cloud copy was
    /// removed or was already gone.
    pub async fn delete(&self, file_id: &str) -> Result<(), SyncError> {
        let resp = self
            .http
            .delete(self.url(&format!("/files/{file_id}")))
            .bearer_auth(&self.user_id)
            .send()
            .await?;
        match resp.status().as_u16() {
            204 | 404 => Ok(()),
            status => Err(SyncError::IoObject(format!("cloud delete failed: {status}"))),
        }
    }

    /// §6.1 `GET /collections/{cid}/files/sync`.
    pub async fn change_feed(
        &self,
        collection_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<(Vec<ChangeFeedEntry>, Option<Cursor>), SyncError> {
        let mut url = self.url(&format!("/collections/{collection_id}/files/sync?limit={limit}"));
        if let Some(c) = &cursor {
            url.push_str(&format!("&cursor={}", encode_cursor(c)?));
        }
        let resp = self.http.get(url).bearer_auth(&self.user_id).send().await?;
        let body: ChangeFeedResponseBody = into_result(resp).await?;
        let next_cursor = body.next_cursor.as_deref().map(decode_cursor).transpose()?;
        Ok((body.entries, next_cursor))
    }
}
