//! The Sync Engine (§4.5): onload, offload, collection reconcile, and the
//! three delete call sites, built on top of a [`LocalFileStore`] and a
//! [`ServerClient`].

use vault_keys::Secret32;
use vault_server::{ChangeFeedEntry, Cursor, FileState as ServerFileState, ServerFileRecord};
use vault_store::{FileRecord, FileState, LocalFileStore, MetadataStore, StorageMode, SyncStatus};

use crate::client::ServerClient;
use crate::error::SyncError;
use crate::wire::{from_wire, to_wire};

/// Default TTL the engine requests for its own onload/offload presigned
/// URLs; well inside §4.4's `0 < ttl ≤ 24h` bound.
const PRESIGNED_TTL_SECONDS: i64 = 3600;

/// `change_feed` page size for `reconcile`.
const SYNC_PAGE_LIMIT: usize = 200;

pub struct SyncEngine<S: MetadataStore> {
    store: LocalFileStore<S>,
    client: ServerClient,
}

fn local_state_from_server(state: ServerFileState) -> FileState {
    match state {
        ServerFileState::Pending => FileState::Pending,
        ServerFileState::Active => FileState::Active,
        ServerFileState::Archived => FileState::Archived,
        ServerFileState::Deleted => FileState::Deleted,
    }
}

impl<S: MetadataStore> SyncEngine<S> {
    pub fn new(store: LocalFileStore<S>, client: ServerClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &LocalFileStore<S> {
        &self.store
    }

    fn record_from_server(record: &ServerFileRecord, sync_status: SyncStatus) -> Result<FileRecord, SyncError> {
        Ok(FileRecord {
            id: record.id.clone(),
            collection_id: record.collection_id.clone(),
            owner_id: record.owner_id.clone(),
            created_by: record.created_by.clone(),
            modified_by: record.modified_by.clone(),
            encrypted_metadata: record.encrypted_metadata.clone(),
            encrypted_file_key: from_wire(&record.encrypted_file_key)?,
            encryption_version: record.encryption_version.clone(),
            encrypted_hash: record.encrypted_hash.clone(),
            encrypted_file_object_key: Some(record.encrypted_file_object_key.clone()),
            encrypted_file_size: record.encrypted_file_size,
            encrypted_thumbnail_object_key: record.encrypted_thumbnail_object_key.clone(),
            encrypted_thumbnail_size: record.encrypted_thumbnail_size,
            state: local_state_from_server(record.state),
            version: record.version,
            created_at: record.created_at,
            modified_at: record.modified_at,
            sync_status,
            storage_mode: StorageMode::EncryptedOnly,
            decrypted_path: None,
            encrypted_path: None,
            cached_name: None,
            cached_mime_type: None,
        })
    }

    fn unlink_local_payloads(record: &FileRecord) {
        if let Some(path) = &record.encrypted_path {
            let _ = std::fs::remove_file(path);
        }
        if let Some(path) = &record.decrypted_path {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Onload (§4.5): pull a server file's ciphertext to local disk.
    /// `storage_mode` is the caller's preference for the final on-disk
    /// representation; `encrypted_only` skips the extra decrypt step.
    pub async fn onload(
        &self,
        file_id: &str,
        collection_key: &Secret32,
        storage_mode: StorageMode,
    ) -> Result<FileRecord, SyncError> {
        let resp = self.client.download_urls(file_id, PRESIGNED_TTL_SECONDS).await?;
        let ciphertext = self.client.get_object(&resp.presigned_download_url.url).await?;

        self.store.ensure_collection_dir(&resp.file.collection_id)?;
        let final_path = self.store.encrypted_path_for(&resp.file.collection_id, &resp.file.id);
        let tmp_path = final_path.with_extension("encrypted.tmp");
        tokio::fs::write(&tmp_path, &ciphertext).await?;
        let tmp_file = tokio::fs::File::open(&tmp_path).await?;
        tmp_file.sync_all().await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        let mut record = Self::record_from_server(&resp.file, SyncStatus::Synced)?;
        record.encrypted_path = Some(final_path);
        self.store.put_record(&record)?;

        if storage_mode == StorageMode::EncryptedOnly {
            Ok(record)
        } else {
            Ok(self.store.unlock(&record.id, collection_key, storage_mode)?)
        }
    }

    /// Offload (§4.5): push a `local_only` file to the cloud and adopt the
    /// server-assigned id.
    pub async fn offload(&self, file_id: &str) -> Result<FileRecord, SyncError> {
        let record = self.store.get(file_id)?;
        if record.sync_status != SyncStatus::LocalOnly {
            return Err(SyncError::StateViolation(format!(
                "file {file_id} is not local_only; nothing to offload"
            )));
        }
        let encrypted_path = record
            .encrypted_path
            .clone()
            .ok_or_else(|| SyncError::StateViolation("no encrypted payload to offload".into()))?;

        let created = self
            .client
            .create_pending(
                &record.collection_id,
                &record.owner_id,
                &record.encrypted_metadata,
                to_wire(&record.encrypted_file_key),
                &record.encryption_version,
                &record.encrypted_hash,
                false,
            )
            .await?;

        let ciphertext = tokio::fs::read(&encrypted_path).await?;
        let size = ciphertext.len() as u64;
        self.client.put_object(&created.presigned_upload_url.url, ciphertext).await?;

        let completed = self.client.complete(&created.file.id, Some(size)).await?;

        let mut new_record = record.clone();
        new_record.id = completed.id.clone();
        new_record.state = local_state_from_server(completed.state);
        new_record.version = completed.version;
        new_record.created_at = completed.created_at;
        new_record.modified_at = completed.modified_at;
        new_record.encrypted_file_object_key = Some(completed.encrypted_file_object_key.clone());
        new_record.encrypted_file_size = completed.encrypted_file_size;
        new_record.encrypted_thumbnail_object_key = completed.encrypted_thumbnail_object_key.clone();
        new_record.encrypted_thumbnail_size = completed.encrypted_thumbnail_size;
        new_record.sync_status = SyncStatus::Synced;

        self.store.rename_record(&record.id, &new_record)?;
        Ok(new_record)
    }

    /// Push a `modified_locally` file's envelope back to its existing
    /// server record (§4.5 collection-sync step 2: "push via offload (or
    /// metadata-only update for metadata-only changes)"). Unlike `offload`,
    /// this re-seals the file IN PLACE under its current server id rather
    /// than allocating a new pending record: the file already has a server
    /// counterpart, it has only diverged from it.
    ///
    /// If the local encrypted payload's size differs from what the server
    /// last recorded, the payload is assumed to have changed and is
    /// re-uploaded to the existing object key before the metadata update;
    /// otherwise only the envelope fields move.
    pub async fn push_modified(&self, file_id: &str) -> Result<FileRecord, SyncError> {
        let record = self.store.get(file_id)?;
        if record.sync_status != SyncStatus::ModifiedLocally {
            return Err(SyncError::StateViolation(format!(
                "file {file_id} is not modified_locally; nothing to push"
            )));
        }
        let encrypted_path = record
            .encrypted_path
            .clone()
            .ok_or_else(|| SyncError::StateViolation("no encrypted payload to push".into()))?;

        let local_size = tokio::fs::metadata(&encrypted_path).await?.len();
        let payload_changed = record.encrypted_file_size != Some(local_size);

        let reported_size = if payload_changed {
            let reupload = self.client.reupload_url(file_id, PRESIGNED_TTL_SECONDS).await?;
            let ciphertext = tokio::fs::read(&encrypted_path).await?;
            self.client.put_object(&reupload.presigned_upload_url.url, ciphertext).await?;
            Some(local_size)
        } else {
            None
        };

        let updated = self
            .client
            .update(file_id, &record.encrypted_metadata, &record.encrypted_hash, reported_size)
            .await?;

        let mut new_record = record.clone();
        new_record.version = updated.version;
        new_record.modified_by = updated.modified_by.clone();
        new_record.modified_at = updated.modified_at;
        new_record.encrypted_file_size = updated.encrypted_file_size;
        new_record.sync_status = SyncStatus::Synced;

        self.store.put_record(&new_record)?;
        Ok(new_record)
    }

    async fn apply_feed_entry(&self, entry: &ChangeFeedEntry) -> Result<(), SyncError> {
        let existing = self.store.get(&entry.id).ok();

        if entry.state == ServerFileState::Deleted {
            if let Some(local) = existing {
                Self::unlink_local_payloads(&local);
                self.store.remove_record(&local.id)?;
            }
            return Ok(());
        }

        match existing {
            None => {
                let stub = Self::record_from_server(&entry.record, SyncStatus::CloudOnly)?;
                self.store.put_record(&stub)?;
            }
            Some(local) => {
                let should_pull = match local.sync_status {
                    SyncStatus::Synced => entry.version > local.version,
                    // Last-writer-wins (§4.5): the loser is replaced
                    // without merging.
                    SyncStatus::ModifiedLocally => {
                        entry.version > local.version && entry.record.modified_at >= local.modified_at
                    }
                    SyncStatus::LocalOnly | SyncStatus::CloudOnly => false,
                };
                if should_pull {
                    Self::unlink_local_payloads(&local);
                    let stub = Self::record_from_server(&entry.record, SyncStatus::CloudOnly)?;
                    self.store.put_record(&stub)?;
                }
            }
        }
        Ok(())
    }

    /// Collection sync (§4.5): page through the change feed from
    /// `starting_cursor`, apply every entry, then push every `local_only`
    /// record via offload and every `modified_locally` record via
    /// `push_modified`. The cursor only advances after a page is fully
    /// applied, so a cancelled sync safely resumes from the prior page.
    pub async fn reconcile(
        &self,
        collection_id: &str,
        starting_cursor: Option<Cursor>,
    ) -> Result<Option<Cursor>, SyncError> {
        let mut cursor = starting_cursor;
        loop {
            let (entries, next_cursor) = self.client.change_feed(collection_id, cursor, SYNC_PAGE_LIMIT).await?;
            if entries.is_empty() {
                break;
            }
            for entry in &entries {
                self.apply_feed_entry(entry).await?;
            }
            let last = entries.last().expect("checked non-empty above");
            cursor = Some(Cursor {
                last_modified: last.modified_at,
                last_id: last.id.clone(),
            });
            if next_cursor.is_none() {
                break;
            }
        }

        for record in self.store.list(Some(collection_id))? {
            match record.sync_status {
                SyncStatus::LocalOnly => {
                    self.offload(&record.id).await?;
                }
                SyncStatus::ModifiedLocally => {
                    self.push_modified(&record.id).await?;
                }
                SyncStatus::Synced | SyncStatus::CloudOnly => {}
            }
        }

        Ok(cursor)
    }

    /// `local_only_delete` (§4.5): client-local only, rejects anything but
    /// `sync_status = local_only`.
    pub fn local_only_delete(&self, file_id: &str) -> Result<(), SyncError> {
        Ok(self.store.delete_local(file_id)?)
    }

    /// `cloud_only_delete` (§4.5): deletes the server record and object;
    /// the local copy is preserved but demoted to `local_only` since its
    /// cloud counterpart is gone.
    pub async fn cloud_only_delete(&self, file_id: &str) -> Result<(), SyncError> {
        self.client.delete(file_id).await?;
        if let Ok(mut record) = self.store.get(file_id) {
            record.sync_status = SyncStatus::LocalOnly;
            self.store.put_record(&record)?;
        }
        Ok(())
    }

    /// Full delete (§4.5): cloud delete first (a "not found" counts as
    /// success); only on confirmed cloud removal do we unlink and drop the
    /// local record. A cloud failure surfaces as [`SyncError::PartialFailure`]
    /// and leaves the local copy untouched.
    pub async fn delete(&self, file_id: &str) -> Result<(), SyncError> {
        match self.client.delete(file_id).await {
            Ok(()) => {
                if let Ok(record) = self.store.get(file_id) {
                    Self::unlink_local_payloads(&record);
                    self.store.remove_record(&record.id)?;
                }
                Ok(())
            }
            Err(e) => Err(SyncError::PartialFailure(format!(
                "cloud delete failed, local copy retained: {e}"
            ))),
        }
    }
}
