//! The Server File Registry (§4.4): the business operations built on top of
//! [`RegistryDb`], [`ObjectStore`], and [`AccessControl`].

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::access::AccessControl;
use crate::error::RegistryError;
use crate::object_store::{ObjectStore, PresignedUrl};
use crate::presign::validate_ttl;
use crate::registry_db::RegistryDb;
use crate::types::{ChangeFeedEntry, Cursor, EncryptedFileKey, FileState, Permission, ServerFileRecord};

/// Default presigned-upload TTL when a caller does not ask for a shorter
/// one (§4.4: "TTL ≤ 24h, default 1h").
pub const DEFAULT_UPLOAD_TTL: Duration = Duration::hours(1);

/// The client-submitted envelope for `create pending` (§6.1 `POST /files`):
/// every `encrypted_*` field except the object keys, which the server
/// derives.
pub struct NewFileRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub created_by: String,
    pub encrypted_metadata: String,
    pub encrypted_file_key: EncryptedFileKey,
    pub encryption_version: String,
    pub encrypted_hash: String,
    pub wants_thumbnail: bool,
}

pub struct Registry {
    db: Arc<dyn RegistryDb>,
    objects: Arc<dyn ObjectStore>,
    access: Arc<dyn AccessControl>,
}

impl Registry {
    pub fn new(db: Arc<dyn RegistryDb>, objects: Arc<dyn ObjectStore>, access: Arc<dyn AccessControl>) -> Self {
        Self { db, objects, access }
    }

    fn validate_new_file(req: &NewFileRequest) -> Result<(), RegistryError> {
        if req.encrypted_metadata.is_empty() {
            return Err(RegistryError::Validation("encrypted_metadata must not be empty".into()));
        }
        if req.encrypted_file_key.ciphertext_b64.is_empty() {
            return Err(RegistryError::Validation(
                "encrypted_file_key.ciphertext must not be empty".into(),
            ));
        }
        if req.encrypted_file_key.nonce_b64.is_empty() {
            return Err(RegistryError::Validation("encrypted_file_key.nonce must not be empty".into()));
        }
        Ok(())
    }

    /// §6.1 `POST /files`: create a pending record and return presigned
    /// upload URL(s) for the client to `PUT` ciphertext against.
    pub async fn create_pending(
        &self,
        user_id: &str,
        req: NewFileRequest,
    ) -> Result<(ServerFileRecord, PresignedUrl, Option<PresignedUrl>), RegistryError> {
        self.access.check_access(&req.collection_id, user_id, Permission::ReadWrite)?;
        Self::validate_new_file(&req)?;

        let id = Uuid::new_v4().to_string();
        // Owner-scoped canonical storage path (DESIGN.md Open Question resolution).
        let object_key = format!("users/{}/files/{}", req.owner_id, id);
        let thumbnail_object_key = req.wants_thumbnail.then(|| format!("{object_key}/thumbnail"));

        let now = Utc::now();
        let record = ServerFileRecord {
            id,
            collection_id: req.collection_id,
            owner_id: req.owner_id,
            created_by: req.created_by.clone(),
            modified_by: req.created_by,
            encrypted_metadata: req.encrypted_metadata,
            encrypted_file_key: req.encrypted_file_key,
            encryption_version: req.encryption_version,
            encrypted_hash: req.encrypted_hash,
            encrypted_file_object_key: object_key.clone(),
            encrypted_file_size: None,
            encrypted_thumbnail_object_key: thumbnail_object_key.clone(),
            encrypted_thumbnail_size: None,
            state: FileState::Pending,
            version: 1,
            created_at: now,
            modified_at: now,
        };

        self.db.insert(record.clone())?;
        tracing::info!(file_id = %record.id, collection_id = %record.collection_id, "file created pending");

        let upload_url = self.objects.presign_upload(&object_key, DEFAULT_UPLOAD_TTL)?;
        let thumbnail_upload_url = match &thumbnail_object_key {
            Some(tk) => Some(self.objects.presign_upload(tk, DEFAULT_UPLOAD_TTL)?),
            None => None,
        };

        Ok((record, upload_url, thumbnail_upload_url))
    }

    /// §6.1 `POST /files/{id}/complete`: verify the object landed, make the
    /// object's size authoritative, and promote `pending -> active`.
    pub async fn complete(
        &self,
        user_id: &str,
        file_id: &str,
        reported_size: Option<u64>,
    ) -> Result<ServerFileRecord, RegistryError> {
        let record = self
            .db
            .get(file_id)?
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadWrite)?;

        if record.state != FileState::Pending {
            return Err(RegistryError::StateViolation("file is not in pending state".into()));
        }

        if !self.objects.exists(&record.encrypted_file_object_key)? {
            return Err(RegistryError::IoObject("file has not been uploaded yet".into()));
        }
        let actual_size = self.objects.size(&record.encrypted_file_object_key)?;
        if let Some(reported) = reported_size {
            if reported != actual_size {
                tracing::warn!(
                    file_id = %file_id, reported, actual = actual_size,
                    "client-reported size disagrees with object storage; trusting object storage"
                );
            }
        }

        let (thumbnail_object_key, thumbnail_size) = match &record.encrypted_thumbnail_object_key {
            Some(tk) => match self.objects.exists(tk)? {
                true => (Some(tk.clone()), Some(self.objects.size(tk)?)),
                false => {
                    tracing::warn!(file_id = %file_id, "expected thumbnail object missing; clearing thumbnail key");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let mut new_record = record.clone();
        new_record.state = FileState::Active;
        new_record.encrypted_file_size = Some(actual_size);
        new_record.encrypted_thumbnail_object_key = thumbnail_object_key;
        new_record.encrypted_thumbnail_size = thumbnail_size;
        new_record.modified_at = Utc::now();
        new_record.version = record.version + 1;

        self.db.cas_update(file_id, record.version, new_record.clone()).map_err(|e| match e {
            // A second concurrent `complete` lost the race: §5 requires
            // exactly one transition succeed, the other sees StateViolation.
            RegistryError::Conflict(_) => RegistryError::StateViolation("file is not in pending state".into()),
            other => other,
        })?;

        tracing::info!(file_id = %file_id, size = actual_size, "file upload completed");
        Ok(new_record)
    }

    /// §6.1 `GET /files/{id}`. Tombstoned (`deleted`) records are hidden
    /// from direct reads; they remain visible via [`Registry::change_feed`].
    pub async fn get(&self, user_id: &str, file_id: &str) -> Result<ServerFileRecord, RegistryError> {
        let record = self
            .db
            .get(file_id)?
            .filter(|r| r.state != FileState::Deleted)
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadOnly)?;
        Ok(record)
    }

    /// §6.1 `GET /files/{id}/download-urls`.
    pub async fn download_urls(
        &self,
        user_id: &str,
        file_id: &str,
        ttl: Duration,
    ) -> Result<(PresignedUrl, Option<PresignedUrl>, ServerFileRecord), RegistryError> {
        validate_ttl(ttl)?;
        let record = self.get(user_id, file_id).await?;
        if record.state != FileState::Active {
            return Err(RegistryError::StateViolation("file is not active".into()));
        }

        let download_url = self.objects.presign_download(&record.encrypted_file_object_key, ttl)?;
        let thumbnail_url = match &record.encrypted_thumbnail_object_key {
            Some(tk) => Some(self.objects.presign_download(tk, ttl)?),
            None => None,
        };
        Ok((download_url, thumbnail_url, record))
    }

    /// A presigned upload URL targeting an `active` file's EXISTING object
    /// key, for §4.5 collection-sync step 2's "push via offload (or
    /// metadata-only update for metadata-only changes)": a
    /// `modified_locally` file already has a server-assigned id and object
    /// key, so re-pushing it re-uses that key rather than allocating a new
    /// pending record the way `create_pending` does.
    pub async fn reupload_url(
        &self,
        user_id: &str,
        file_id: &str,
        ttl: Duration,
    ) -> Result<(PresignedUrl, ServerFileRecord), RegistryError> {
        validate_ttl(ttl)?;
        let record = self
            .db
            .get(file_id)?
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadWrite)?;
        if record.state != FileState::Active {
            return Err(RegistryError::StateViolation("file is not active".into()));
        }
        let upload_url = self.objects.presign_upload(&record.encrypted_file_object_key, ttl)?;
        Ok((upload_url, record))
    }

    /// §4.5 "push via offload (or metadata-only update for metadata-only
    /// changes)": re-seal the envelope of an already-`active` file in
    /// place. If `reported_size` is given (the client re-uploaded payload
    /// ciphertext via [`Registry::reupload_url`] first), the object's
    /// actual size is re-verified and made authoritative exactly like
    /// `complete`; a metadata-only push omits it and the object is left
    /// untouched.
    pub async fn update(
        &self,
        user_id: &str,
        file_id: &str,
        encrypted_metadata: String,
        encrypted_hash: String,
        reported_size: Option<u64>,
    ) -> Result<ServerFileRecord, RegistryError> {
        if encrypted_metadata.is_empty() {
            return Err(RegistryError::Validation("encrypted_metadata must not be empty".into()));
        }
        let record = self
            .db
            .get(file_id)?
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadWrite)?;
        if record.state != FileState::Active {
            return Err(RegistryError::StateViolation("file is not active".into()));
        }

        let mut new_record = record.clone();
        new_record.encrypted_metadata = encrypted_metadata;
        new_record.encrypted_hash = encrypted_hash;
        new_record.modified_by = user_id.to_string();
        new_record.modified_at = Utc::now();
        new_record.version = record.version + 1;

        if reported_size.is_some() {
            if !self.objects.exists(&record.encrypted_file_object_key)? {
                return Err(RegistryError::IoObject("updated payload has not been uploaded yet".into()));
            }
            new_record.encrypted_file_size = Some(self.objects.size(&record.encrypted_file_object_key)?);
        }

        self.db.cas_update(file_id, record.version, new_record.clone())?;
        tracing::info!(file_id = %file_id, version = new_record.version, "file updated");
        Ok(new_record)
    }

    /// §6.1 `POST /files/{id}/archive`: `active -> archived` only.
    pub async fn archive(&self, user_id: &str, file_id: &str) -> Result<ServerFileRecord, RegistryError> {
        let record = self
            .db
            .get(file_id)?
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadWrite)?;

        if !record.state.can_transition_to(FileState::Archived) {
            return Err(RegistryError::StateViolation(format!(
                "cannot archive a file in state {:?}",
                record.state
            )));
        }

        let mut new_record = record.clone();
        new_record.state = FileState::Archived;
        new_record.modified_at = Utc::now();
        new_record.version = record.version + 1;
        self.db.cas_update(file_id, record.version, new_record.clone())?;

        tracing::info!(file_id = %file_id, "file archived");
        Ok(new_record)
    }

    /// §6.1 `DELETE /files/{id}`: removes the record regardless of current
    /// state and best-effort removes the backing object(s) (§4.4 State
    /// transitions). The record is tombstoned, not physically removed, so
    /// it can surface in the change feed for one epoch.
    pub async fn delete(&self, user_id: &str, file_id: &str) -> Result<(), RegistryError> {
        let record = self
            .db
            .get(file_id)?
            .ok_or_else(|| RegistryError::NotFound(file_id.to_string()))?;
        self.access.check_access(&record.collection_id, user_id, Permission::ReadWrite)?;

        if let Err(err) = self.objects.delete(&record.encrypted_file_object_key) {
            tracing::warn!(file_id = %file_id, %err, "object deletion failed during file delete; continuing");
        }
        if let Some(tk) = &record.encrypted_thumbnail_object_key {
            if let Err(err) = self.objects.delete(tk) {
                tracing::warn!(file_id = %file_id, %err, "thumbnail object deletion failed during file delete; continuing");
            }
        }

        let mut new_record = record.clone();
        new_record.state = FileState::Deleted;
        new_record.modified_at = Utc::now();
        new_record.version = record.version + 1;
        self.db.cas_update(file_id, record.version, new_record)?;

        tracing::info!(file_id = %file_id, "file deleted");
        Ok(())
    }

    /// Stale-pending and tombstone GC (§4.4 "if `complete` is never invoked,
    /// the pending record remains; see §7 for cleanup", §8.3 boundary
    /// behavior: "a pending record older than a configured horizon is
    /// eligible for garbage collection along with any uploaded-but-
    /// uncompleted object"). Also reaps `deleted` tombstones past the
    /// change-feed retention window (§4.4 "the server may garbage-collect
    /// tombstones after a bounded retention"), since both are "records the
    /// client can no longer act on, aged past their retention" and share
    /// the same db-level primitive.
    ///
    /// Best-effort: an object deletion failure for a reaped pending upload
    /// is logged and does not stop the sweep, mirroring `delete`'s
    /// best-effort object cleanup (§4.4 State transitions).
    pub async fn gc(&self, pending_horizon: Duration, tombstone_retention: Duration) -> Result<usize, RegistryError> {
        let now = Utc::now();

        let pending_cutoff = now - pending_horizon;
        let is_pending = |r: &ServerFileRecord| r.state == FileState::Pending;
        for record in self.db.find_older_than(pending_cutoff, &is_pending)? {
            if let Err(err) = self.objects.delete(&record.encrypted_file_object_key) {
                tracing::warn!(file_id = %record.id, %err, "stale pending object deletion failed; continuing gc");
            }
            if let Some(tk) = &record.encrypted_thumbnail_object_key {
                if let Err(err) = self.objects.delete(tk) {
                    tracing::warn!(file_id = %record.id, %err, "stale pending thumbnail object deletion failed; continuing gc");
                }
            }
        }
        let stale_pending = self.db.purge_older_than(pending_cutoff, &is_pending)?;

        let tombstone_cutoff = now - tombstone_retention;
        let reaped_tombstones = self.db.purge_older_than(tombstone_cutoff, &|r| r.state == FileState::Deleted)?;

        if stale_pending > 0 {
            tracing::info!(count = stale_pending, "garbage-collected stale pending file records");
        }
        if reaped_tombstones > 0 {
            tracing::info!(count = reaped_tombstones, "garbage-collected deleted-state tombstones");
        }
        Ok(stale_pending + reaped_tombstones)
    }

    /// §4.4 Change feed: one page of `(modified_at, id)`-ordered entries.
    pub async fn change_feed(
        &self,
        user_id: &str,
        collection_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<(Vec<ChangeFeedEntry>, Option<Cursor>), RegistryError> {
        self.access.check_access(collection_id, user_id, Permission::ReadOnly)?;
        let (records, next_cursor) = self.db.change_feed(collection_id, cursor, limit)?;
        let entries = records
            .into_iter()
            .map(|r| ChangeFeedEntry { id: r.id.clone(), version: r.version, modified_at: r.modified_at, state: r.state, record: r })
            .collect();
        Ok((entries, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::InMemoryAccessControl;
    use crate::object_store::InMemoryObjectStore;
    use crate::registry_db::InMemoryRegistryDb;

    fn harness() -> (Registry, Arc<InMemoryObjectStore>) {
        let db = Arc::new(InMemoryRegistryDb::new());
        let objects = Arc::new(InMemoryObjectStore::new([3u8; 32], "http://test"));
        let access = Arc::new(InMemoryAccessControl::new());
        access.grant("c1", "u1", Permission::ReadWrite);
        (Registry::new(db, objects.clone(), access), objects)
    }

    fn new_file_req() -> NewFileRequest {
        NewFileRequest {
            collection_id: "c1".into(),
            owner_id: "u1".into(),
            created_by: "u1".into(),
            encrypted_metadata: "meta".into(),
            encrypted_file_key: EncryptedFileKey {
                key_version: 1,
                ciphertext_b64: "ct".into(),
                nonce_b64: "n".into(),
                previous_keys: Vec::new(),
            },
            encryption_version: "1.0".into(),
            encrypted_hash: "hash".into(),
            wants_thumbnail: false,
        }
    }

    #[tokio::test]
    async fn complete_without_upload_is_io_object_error() {
        let (registry, _objects) = harness();
        let (record, _upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();

        let err = registry.complete("u1", &record.id, None).await.unwrap_err();
        assert!(matches!(err, RegistryError::IoObject(_)));

        let reloaded = registry.db.get(&record.id).unwrap().unwrap();
        assert_eq!(reloaded.state, FileState::Pending);
    }

    #[tokio::test]
    async fn double_complete_is_state_violation() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();

        let completed = registry.complete("u1", &record.id, None).await.unwrap();
        assert_eq!(completed.state, FileState::Active);

        let err = registry.complete("u1", &record.id, None).await.unwrap_err();
        assert!(matches!(err, RegistryError::StateViolation(_)));
    }

    #[tokio::test]
    async fn archive_then_delete_matches_scenario_six() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();
        registry.complete("u1", &record.id, None).await.unwrap();

        registry.archive("u1", &record.id).await.unwrap();
        registry.delete("u1", &record.id).await.unwrap();

        let err = registry.get("u1", &record.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(!objects.exists(&object_key).unwrap());
    }

    #[tokio::test]
    async fn forbidden_leaks_no_detail_for_unknown_collection() {
        let (registry, _objects) = harness();
        let mut req = new_file_req();
        req.collection_id = "does-not-exist".into();
        let err = registry.create_pending("u1", req).await.unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden));
    }

    #[tokio::test]
    async fn empty_encrypted_metadata_rejected_at_create() {
        let (registry, _objects) = harness();
        let mut req = new_file_req();
        req.encrypted_metadata = String::new();
        let err = registry.create_pending("u1", req).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn ttl_out_of_bounds_rejected_for_download_urls() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();
        registry.complete("u1", &record.id, None).await.unwrap();

        let err = registry
            .download_urls("u1", &record.id, Duration::hours(25))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn gc_reaps_stale_pending_record_and_its_object() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();

        // Backdate the record past the GC horizon without going through
        // `complete` — simulates an abandoned two-phase upload (§8.3).
        let mut backdated = registry.db.get(&record.id).unwrap().unwrap();
        backdated.modified_at = Utc::now() - Duration::hours(48);
        registry.db.cas_update(&record.id, backdated.version, backdated).unwrap();

        let reaped = registry.gc(Duration::hours(24), Duration::hours(168)).await.unwrap();
        assert_eq!(reaped, 1);
        assert!(registry.db.get(&record.id).unwrap().is_none());
        assert!(!objects.exists(&object_key).unwrap());
    }

    #[tokio::test]
    async fn gc_leaves_fresh_pending_record_untouched() {
        let (registry, _objects) = harness();
        let (record, _upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();

        let reaped = registry.gc(Duration::hours(24), Duration::hours(168)).await.unwrap();
        assert_eq!(reaped, 0);
        assert!(registry.db.get(&record.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn gc_reaps_old_tombstone_but_not_active_record() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();
        registry.complete("u1", &record.id, None).await.unwrap();
        registry.delete("u1", &record.id).await.unwrap();

        let mut tombstone = registry.db.get(&record.id).unwrap().unwrap();
        tombstone.modified_at = Utc::now() - Duration::hours(200);
        registry.db.cas_update(&record.id, tombstone.version, tombstone).unwrap();

        let reaped = registry.gc(Duration::hours(24), Duration::hours(168)).await.unwrap();
        assert_eq!(reaped, 1);
        assert!(registry.db.get(&record.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn update_bumps_version_and_reseals_envelope() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();
        let active = registry.complete("u1", &record.id, None).await.unwrap();

        let updated = registry
            .update("u1", &record.id, "new-meta".into(), "new-hash".into(), None)
            .await
            .unwrap();

        assert_eq!(updated.encrypted_metadata, "new-meta");
        assert_eq!(updated.encrypted_hash, "new-hash");
        assert_eq!(updated.version, active.version + 1);
        assert_eq!(updated.encrypted_file_size, active.encrypted_file_size);
    }

    #[tokio::test]
    async fn update_with_reuploaded_payload_refreshes_size() {
        let (registry, objects) = harness();
        let (record, upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();
        let object_key = objects.resolve_token(&upload.url).unwrap();
        objects.put(&object_key, b"ciphertext").unwrap();
        registry.complete("u1", &record.id, None).await.unwrap();

        let (reupload, reupload_record) = registry.reupload_url("u1", &record.id, Duration::hours(1)).await.unwrap();
        assert_eq!(reupload_record.id, record.id);
        let reupload_key = objects.resolve_token(&reupload.url).unwrap();
        assert_eq!(reupload_key, object_key);
        objects.put(&reupload_key, b"much longer ciphertext").unwrap();

        let updated = registry
            .update("u1", &record.id, "meta2".into(), "hash2".into(), Some(23))
            .await
            .unwrap();
        assert_eq!(updated.encrypted_file_size, Some(23));
    }

    #[tokio::test]
    async fn update_rejects_pending_file() {
        let (registry, _objects) = harness();
        let (record, _upload, _thumb) = registry.create_pending("u1", new_file_req()).await.unwrap();

        let err = registry
            .update("u1", &record.id, "meta".into(), "hash".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::StateViolation(_)));
    }
}
