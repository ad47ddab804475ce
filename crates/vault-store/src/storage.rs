//! Metadata storage backends: where `FileRecord`s live (§4.3, §6.2: the
//! key-value store is prefixed `file:`/`collection:`/`user:` to avoid
//! collisions; this crate only owns the `file:` namespace).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StoreError;
use crate::types::FileRecord;

/// Transactional byte-map over file metadata. Spec.md treats the
/// underlying key-value store as an opaque transactional byte-map; this
/// trait is the narrow slice of it the store needs.
pub trait MetadataStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<FileRecord>, StoreError>;
    fn put(&self, record: &FileRecord) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<FileRecord>, StoreError>;
    fn list_by_collection(&self, collection_id: &str) -> Result<Vec<FileRecord>, StoreError>;
}

/// In-memory backend, used by tests and as a reference implementation.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, FileRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let records = self.records.read().expect("metadata store lock poisoned");
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().expect("metadata store lock poisoned");
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().expect("metadata store lock poisoned");
        records.remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
        let records = self.records.read().expect("metadata store lock poisoned");
        Ok(records.values().cloned().collect())
    }

    fn list_by_collection(&self, collection_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let records = self.records.read().expect("metadata store lock poisoned");
        Ok(records
            .values()
            .filter(|r| r.collection_id == collection_id)
            .cloned()
            .collect())
    }
}

/// File-based backend: one JSON document per record under `⟨dir⟩/⟨id⟩.json`,
/// written atomically (write to `.tmp`, then rename).
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_record_file(&self, path: &Path) -> Result<FileRecord, StoreError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl MetadataStore for FileMetadataStore {
    fn get(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_record_file(&path).map(Some)
    }

    fn put(&self, record: &FileRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id);
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                out.push(self.read_record_file(&path)?);
            }
        }
        Ok(out)
    }

    fn list_by_collection(&self, collection_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.collection_id == collection_id)
            .collect())
    }
}
