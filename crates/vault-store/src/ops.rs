//! Local File Store operations (§4.3): `add`, `list`, `get`, `delete_local`,
//! `lock`, `unlock`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use vault_crypto::{aead_decrypt, aead_encrypt, combine, decode_b64, encode_b64, split, ENCRYPTION_VERSION};
use vault_keys::{decrypt_file_key, EncryptedKey, Secret32};

use crate::error::StoreError;
use crate::storage::MetadataStore;
use crate::transaction::Transaction;
use crate::types::{FileMetadata, FileRecord, FileState, StorageMode, SyncStatus};

/// The Local File Store: a metadata backend plus the on-disk payload root
/// `⟨app⟩/files/bin` (§6.2).
pub struct LocalFileStore<S: MetadataStore> {
    store: S,
    payload_root: PathBuf,
}

impl<S: MetadataStore> LocalFileStore<S> {
    pub fn new(store: S, payload_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            payload_root: payload_root.into(),
        }
    }

    fn encrypted_path(&self, collection_id: &str, file_id: &str) -> PathBuf {
        self.payload_root
            .join(collection_id)
            .join(format!("{file_id}.encrypted"))
    }

    fn decrypted_path(&self, collection_id: &str, file_id: &str, ext: &str) -> PathBuf {
        let file_name = if ext.is_empty() {
            file_id.to_string()
        } else {
            format!("{file_id}.{ext}")
        };
        self.payload_root.join(collection_id).join(file_name)
    }

    /// The path an `encrypted_only` payload for `(collection_id, file_id)`
    /// lives at. Exposed so `vault-sync` can target `onload`'s atomic
    /// download-to-temp-then-rename (§4.5) at the same location `add`/`lock`
    /// would use.
    pub fn encrypted_path_for(&self, collection_id: &str, file_id: &str) -> PathBuf {
        self.encrypted_path(collection_id, file_id)
    }

    /// Ensures `⟨payload_root⟩/⟨collection_id⟩` exists, for callers (e.g.
    /// `vault-sync::onload`) that write a payload before they have a
    /// `FileRecord` to call [`LocalFileStore::add`] through.
    pub fn ensure_collection_dir(&self, collection_id: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.payload_root.join(collection_id))?;
        Ok(())
    }

    /// Insert or replace a record directly. Used by `vault-sync` to write
    /// `cloud_only` stubs and to fold in server-side state after a
    /// reconcile pull (§4.5) — operations the Sync Engine owns, not the
    /// Local File Store itself, but which still go through the same
    /// metadata backend and its transactional guarantees.
    pub fn put_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.store.put(record)
    }

    /// Remove a record by id without touching on-disk payloads. Used by
    /// `vault-sync` when a server `state = deleted` tombstone reaches
    /// reconcile and the local payloads have already been unlinked
    /// separately (§4.5 collection sync step 1).
    pub fn remove_record(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id)
    }

    /// Re-key a record from `old_id` to `new_record.id`, renaming any
    /// on-disk payload paths (still pointing at `old_id`'s layout) to match.
    /// Used by `vault-sync::offload` to adopt a server-assigned id (§4.5
    /// step 4: "Adopt the server-assigned `id` (if it differs)").
    pub fn rename_record(&self, old_id: &str, new_record: &FileRecord) -> Result<(), StoreError> {
        if old_id == new_record.id {
            return self.store.put(new_record);
        }
        let mut renamed = new_record.clone();
        if let Some(old_path) = &new_record.encrypted_path {
            if old_path.exists() {
                let new_path = self.encrypted_path(&new_record.collection_id, &new_record.id);
                std::fs::rename(old_path, &new_path)?;
                renamed.encrypted_path = Some(new_path);
            }
        }
        if let Some(old_path) = &new_record.decrypted_path {
            if old_path.exists() {
                let ext = old_path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let new_path = self.decrypted_path(&new_record.collection_id, &new_record.id, &ext);
                std::fs::rename(old_path, &new_path)?;
                renamed.decrypted_path = Some(new_path);
            }
        }
        self.store.put(&renamed)?;
        self.store.delete(old_id)?;
        Ok(())
    }

    /// `add` (§4.3): encrypts `source_path`'s contents under a freshly
    /// generated file key, writes the on-disk payload(s) implied by
    /// `storage_mode`, and inserts a new `local_only`/`pending` record.
    /// Any failure before the record is durably stored unwinds every
    /// payload path this call wrote.
    pub fn add(
        &self,
        source_path: &Path,
        collection_id: &str,
        owner_id: &str,
        mime_type: &str,
        storage_mode: StorageMode,
        collection_key: &Secret32,
    ) -> Result<FileRecord, StoreError> {
        let plaintext = std::fs::read(source_path)?;
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let ext = source_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file_id = Uuid::new_v4().to_string();
        std::fs::create_dir_all(self.payload_root.join(collection_id))?;

        let file_key = Secret32::new(vault_crypto::random_bytes::<32>()?);
        let mut txn = Transaction::begin();

        let sealed_payload = file_key.with_exposed(|k| aead_encrypt(&plaintext, k))?;
        let enc_path = self.encrypted_path(collection_id, &file_id);
        let framed_payload = combine(&sealed_payload.nonce, &sealed_payload.ciphertext);
        let encrypted_file_size = framed_payload.len() as u64;
        std::fs::write(&enc_path, &framed_payload)?;
        txn.track_write(enc_path.clone());

        let decrypted_path = match storage_mode {
            StorageMode::EncryptedOnly => None,
            StorageMode::Hybrid | StorageMode::DecryptedOnly => {
                let path = self.decrypted_path(collection_id, &file_id, &ext);
                std::fs::write(&path, &plaintext)?;
                txn.track_write(path.clone());
                Some(path)
            }
        };

        let now = Utc::now();
        let metadata = FileMetadata {
            name: name.clone(),
            mime_type: mime_type.to_string(),
            size: plaintext.len() as u64,
            created: now,
            decrypted_file_path: decrypted_path.clone(),
            decrypted_file_size: decrypted_path.as_ref().map(|_| plaintext.len() as u64),
            encrypted_file_path: Some(enc_path.clone()),
            encrypted_file_size: Some(encrypted_file_size),
            thumbnail_name: None,
            thumbnail_size: None,
        };
        let metadata_json = serde_json::to_vec(&metadata)?;
        let sealed_metadata = file_key.with_exposed(|k| aead_encrypt(&metadata_json, k))?;
        let encrypted_metadata = encode_b64(&sealed_metadata.nonce, &sealed_metadata.ciphertext);

        let digest: [u8; 32] = Sha256::digest(&plaintext).into();
        let sealed_hash = file_key.with_exposed(|k| aead_encrypt(&digest, k))?;
        let encrypted_hash = encode_b64(&sealed_hash.nonce, &sealed_hash.ciphertext);

        let encrypted_file_key =
            file_key.with_exposed(|bytes| EncryptedKey::seal(bytes, collection_key.expose(), 1))?;

        let record = FileRecord {
            id: file_id,
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            created_by: owner_id.to_string(),
            modified_by: owner_id.to_string(),
            encrypted_metadata,
            encrypted_file_key,
            encryption_version: ENCRYPTION_VERSION.to_string(),
            encrypted_hash,
            encrypted_file_object_key: None,
            encrypted_file_size: None,
            encrypted_thumbnail_object_key: None,
            encrypted_thumbnail_size: None,
            state: FileState::Pending,
            version: 1,
            created_at: now,
            modified_at: now,
            sync_status: SyncStatus::LocalOnly,
            storage_mode,
            decrypted_path,
            encrypted_path: Some(enc_path),
            cached_name: Some(name),
            cached_mime_type: Some(mime_type.to_string()),
        };

        self.store.put(&record)?;
        txn.commit();
        Ok(record)
    }

    pub fn list(&self, collection_id: Option<&str>) -> Result<Vec<FileRecord>, StoreError> {
        match collection_id {
            Some(cid) => self.store.list_by_collection(cid),
            None => self.store.list(),
        }
    }

    pub fn get(&self, id: &str) -> Result<FileRecord, StoreError> {
        self.store
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// `delete_local` (§4.3): only valid when `sync_status = local_only`.
    pub fn delete_local(&self, id: &str) -> Result<(), StoreError> {
        let record = self.get(id)?;
        if record.sync_status != SyncStatus::LocalOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} is not local_only; delete its cloud copy or sync first"
            )));
        }
        if let Some(path) = &record.encrypted_path {
            ignore_not_found(std::fs::remove_file(path))?;
        }
        if let Some(path) = &record.decrypted_path {
            ignore_not_found(std::fs::remove_file(path))?;
        }
        self.store.delete(id)
    }

    /// `lock` (§4.3): `storage_mode -> encrypted_only`. Rejects
    /// `sync_status = cloud_only` (no local payload to act on — caller must
    /// `onload` first, per §4.5) and rejects a record already
    /// `encrypted_only`.
    pub fn lock(&self, id: &str, collection_key: &Secret32) -> Result<FileRecord, StoreError> {
        let mut record = self.get(id)?;
        if record.sync_status == SyncStatus::CloudOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} has no local payload; onload before lock"
            )));
        }
        if record.storage_mode == StorageMode::EncryptedOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} is already encrypted_only"
            )));
        }

        let file_key = decrypt_file_key(&record.encrypted_file_key, collection_key)?;
        let mut txn = Transaction::begin();

        if record.encrypted_path.is_none() {
            let decrypted_path = record
                .decrypted_path
                .clone()
                .ok_or_else(|| StoreError::StateViolation("no payload available to lock".into()))?;
            let plaintext = std::fs::read(&decrypted_path)?;
            let sealed = file_key.with_exposed(|k| aead_encrypt(&plaintext, k))?;
            let enc_path = self.encrypted_path(&record.collection_id, &record.id);
            std::fs::write(&enc_path, combine(&sealed.nonce, &sealed.ciphertext))?;
            txn.track_write(enc_path.clone());
            record.encrypted_path = Some(enc_path);
        }

        if let Some(decrypted_path) = record.decrypted_path.take() {
            ignore_not_found(std::fs::remove_file(&decrypted_path))?;
        }
        record.storage_mode = StorageMode::EncryptedOnly;
        record.modified_at = Utc::now();

        self.store.put(&record)?;
        txn.commit();
        Ok(record)
    }

    /// `unlock` (§4.3): `storage_mode -> hybrid | decrypted_only`. Rejects
    /// `sync_status = cloud_only` and a record with no encrypted payload.
    pub fn unlock(
        &self,
        id: &str,
        collection_key: &Secret32,
        target_mode: StorageMode,
    ) -> Result<FileRecord, StoreError> {
        if target_mode == StorageMode::EncryptedOnly {
            return Err(StoreError::Validation(
                "unlock must target hybrid or decrypted_only".into(),
            ));
        }
        let mut record = self.get(id)?;
        if record.sync_status == SyncStatus::CloudOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} has no local payload; onload before unlock"
            )));
        }
        let enc_path = record
            .encrypted_path
            .clone()
            .ok_or_else(|| StoreError::StateViolation("no encrypted payload to unlock".into()))?;

        // Decrypt the file key BEFORE touching disk: a wrong password must
        // leave no trace (§8.2 scenario 2).
        let file_key = decrypt_file_key(&record.encrypted_file_key, collection_key)?;

        let raw = std::fs::read(&enc_path)?;
        let (nonce, ciphertext) = split(&raw)?;
        let plaintext = file_key.with_exposed(|k| aead_decrypt(ciphertext, &nonce, k))?;

        let mut txn = Transaction::begin();
        let ext = record
            .cached_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dec_path = self.decrypted_path(&record.collection_id, &record.id, &ext);
        std::fs::write(&dec_path, &plaintext)?;
        txn.track_write(dec_path.clone());
        record.decrypted_path = Some(dec_path);

        if target_mode == StorageMode::DecryptedOnly {
            std::fs::remove_file(&enc_path)?;
            record.encrypted_path = None;
        }
        record.storage_mode = target_mode;
        record.modified_at = Utc::now();

        self.store.put(&record)?;
        txn.commit();
        Ok(record)
    }

    /// Re-seal `record`'s metadata envelope with a freshly serialized
    /// [`FileMetadata`] and advance its sync status (§3.3 "Mutation →
    /// modified_locally"). Shared by `update_metadata` and `update_payload`.
    fn reseal_metadata(
        &self,
        mut record: FileRecord,
        collection_key: &Secret32,
        metadata: &FileMetadata,
    ) -> Result<FileRecord, StoreError> {
        let file_key = decrypt_file_key(&record.encrypted_file_key, collection_key)?;
        let metadata_json = serde_json::to_vec(metadata)?;
        let sealed_metadata = file_key.with_exposed(|k| aead_encrypt(&metadata_json, k))?;
        record.encrypted_metadata = encode_b64(&sealed_metadata.nonce, &sealed_metadata.ciphertext);
        record.cached_name = Some(metadata.name.clone());
        record.cached_mime_type = Some(metadata.mime_type.clone());
        record.modified_at = Utc::now();
        if record.sync_status == SyncStatus::Synced {
            record.sync_status = SyncStatus::ModifiedLocally;
        }
        self.store.put(&record)?;
        Ok(record)
    }

    /// `update_metadata` (§3.3 "Mutation → modified_locally"): rename a file
    /// and/or change its recorded MIME type in place. Requires a local
    /// payload to derive the file key's context from (`cloud_only` has
    /// none; `onload` first, per §4.5).
    pub fn update_metadata(
        &self,
        id: &str,
        collection_key: &Secret32,
        name: Option<String>,
        mime_type: Option<String>,
    ) -> Result<FileRecord, StoreError> {
        let record = self.get(id)?;
        if record.sync_status == SyncStatus::CloudOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} has no local payload; onload before updating metadata"
            )));
        }
        if name.is_none() && mime_type.is_none() {
            return Err(StoreError::Validation("nothing to update".into()));
        }

        let file_key = decrypt_file_key(&record.encrypted_file_key, collection_key)?;
        let (nonce, ciphertext) = decode_b64(&record.encrypted_metadata)?;
        let plaintext = file_key.with_exposed(|k| aead_decrypt(&ciphertext, &nonce, k))?;
        let mut metadata: FileMetadata = serde_json::from_slice(&plaintext)?;
        if let Some(name) = name {
            metadata.name = name;
        }
        if let Some(mime_type) = mime_type {
            metadata.mime_type = mime_type;
        }

        self.reseal_metadata(record, collection_key, &metadata)
    }

    /// `update_payload` (§3.3 "Mutation → modified_locally"): replace a
    /// file's contents with `source_path`'s, re-encrypting under the same
    /// file key and refreshing the integrity hash and cached size.
    ///
    /// Unlike `add`/`lock`, this overwrites payload paths that already
    /// belong to a live record rather than creating new ones, so
    /// `Transaction`'s unwind-by-deleting isn't applicable here (deleting a
    /// freshly overwritten path on a later failure would destroy the only
    /// remaining copy, not restore one). The encryption itself can only
    /// fail on RNG exhaustion, so the window between overwriting disk and
    /// committing the record is effectively unreachable in practice.
    pub fn update_payload(
        &self,
        id: &str,
        source_path: &Path,
        modified_by: &str,
        collection_key: &Secret32,
    ) -> Result<FileRecord, StoreError> {
        let record = self.get(id)?;
        if record.sync_status == SyncStatus::CloudOnly {
            return Err(StoreError::StateViolation(format!(
                "file {id} has no local payload; onload before updating it"
            )));
        }
        let enc_path = record
            .encrypted_path
            .clone()
            .ok_or_else(|| StoreError::StateViolation("no encrypted payload to update".into()))?;

        let plaintext = std::fs::read(source_path)?;
        let file_key = decrypt_file_key(&record.encrypted_file_key, collection_key)?;

        let sealed_payload = file_key.with_exposed(|k| aead_encrypt(&plaintext, k))?;
        let digest: [u8; 32] = Sha256::digest(&plaintext).into();
        let sealed_hash = file_key.with_exposed(|k| aead_encrypt(&digest, k))?;
        let (nonce, ciphertext) = decode_b64(&record.encrypted_metadata)?;
        let metadata_plaintext = file_key.with_exposed(|k| aead_decrypt(&ciphertext, &nonce, k))?;
        let mut metadata: FileMetadata = serde_json::from_slice(&metadata_plaintext)?;

        let framed_payload = combine(&sealed_payload.nonce, &sealed_payload.ciphertext);
        let encrypted_file_size = framed_payload.len() as u64;
        std::fs::write(&enc_path, &framed_payload)?;
        if let Some(decrypted_path) = &record.decrypted_path {
            std::fs::write(decrypted_path, &plaintext)?;
        }

        metadata.size = plaintext.len() as u64;
        metadata.encrypted_file_size = Some(encrypted_file_size);
        metadata.decrypted_file_size = record.decrypted_path.as_ref().map(|_| plaintext.len() as u64);

        let encrypted_hash = encode_b64(&sealed_hash.nonce, &sealed_hash.ciphertext);
        let mut record = record;
        record.encrypted_hash = encrypted_hash;
        record.encrypted_file_size = Some(encrypted_file_size);
        record.modified_by = modified_by.to_string();

        self.reseal_metadata(record, collection_key, &metadata)
    }
}

fn ignore_not_found(result: std::io::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
