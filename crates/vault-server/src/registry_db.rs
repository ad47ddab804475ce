//! The file-record database (§4.4, §5 compare-and-set concurrency model).
//!
//! `cas_update` is the server's one mutation primitive: every state
//! transition and every metadata update goes through it, so `version`
//! monotonicity (§3.2 invariant 5) and "concurrent `complete` calls result
//! in exactly one `active` transition" (§5) both reduce to one
//! compare-and-set check.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::error::RegistryError;
use crate::types::{Cursor, ServerFileRecord};

pub trait RegistryDb: Send + Sync {
    fn insert(&self, record: ServerFileRecord) -> Result<(), RegistryError>;
    fn get(&self, id: &str) -> Result<Option<ServerFileRecord>, RegistryError>;

    /// Replace the stored record for `id` iff its current `version` equals
    /// `expected_version`. Returns [`RegistryError::Conflict`] otherwise —
    /// the caller (e.g. a second concurrent `complete`) loses the race.
    fn cas_update(&self, id: &str, expected_version: u64, new_record: ServerFileRecord) -> Result<(), RegistryError>;

    /// One page of the change feed for `collection_id`, ordered by
    /// `(modified_at ASC, id ASC)`, strictly after `cursor`.
    fn change_feed(
        &self,
        collection_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<(Vec<ServerFileRecord>, Option<Cursor>), RegistryError>;

    /// Permanently remove records matching `predicate` whose `modified_at`
    /// is older than `cutoff`. Used for tombstone GC (§4.4) and stale
    /// pending-record GC (§8.3).
    fn purge_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
        predicate: &dyn Fn(&ServerFileRecord) -> bool,
    ) -> Result<usize, RegistryError>;

    /// Records matching `predicate` whose `modified_at` is older than
    /// `cutoff`, without removing them. Used by GC to locate the objects a
    /// stale pending record's upload left behind before purging the record
    /// itself (§8.3: "along with any uploaded-but-uncompleted object").
    fn find_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
        predicate: &dyn Fn(&ServerFileRecord) -> bool,
    ) -> Result<Vec<ServerFileRecord>, RegistryError>;
}

#[derive(Default)]
pub struct InMemoryRegistryDb {
    records: RwLock<HashMap<String, ServerFileRecord>>,
}

impl InMemoryRegistryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cursor_of(record: &ServerFileRecord) -> Cursor {
    Cursor {
        last_modified: record.modified_at,
        last_id: record.id.clone(),
    }
}

fn after_cursor(record: &ServerFileRecord, cursor: &Cursor) -> bool {
    (record.modified_at, record.id.as_str()) > (cursor.last_modified, cursor.last_id.as_str())
}

impl RegistryDb for InMemoryRegistryDb {
    fn insert(&self, record: ServerFileRecord) -> Result<(), RegistryError> {
        let mut records = self.records.write().expect("registry db lock poisoned");
        if records.contains_key(&record.id) {
            return Err(RegistryError::Validation(format!("duplicate file id {}", record.id)));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ServerFileRecord>, RegistryError> {
        let records = self.records.read().expect("registry db lock poisoned");
        Ok(records.get(id).cloned())
    }

    fn cas_update(&self, id: &str, expected_version: u64, new_record: ServerFileRecord) -> Result<(), RegistryError> {
        let mut records = self.records.write().expect("registry db lock poisoned");
        match records.get(id) {
            None => Err(RegistryError::NotFound(id.to_string())),
            Some(current) if current.version != expected_version => Err(RegistryError::Conflict(format!(
                "file {id} version {} does not match expected {expected_version}",
                current.version
            ))),
            Some(_) => {
                records.insert(id.to_string(), new_record);
                Ok(())
            }
        }
    }

    fn change_feed(
        &self,
        collection_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<(Vec<ServerFileRecord>, Option<Cursor>), RegistryError> {
        let records = self.records.read().expect("registry db lock poisoned");
        let mut page: Vec<ServerFileRecord> = records
            .values()
            .filter(|r| r.collection_id == collection_id)
            .filter(|r| cursor.as_ref().map(|c| after_cursor(r, c)).unwrap_or(true))
            .cloned()
            .collect();
        page.sort_by(|a, b| (a.modified_at, a.id.as_str()).cmp(&(b.modified_at, b.id.as_str())));
        page.truncate(limit);
        let next_cursor = page.last().map(cursor_of);
        Ok((page, next_cursor))
    }

    fn purge_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
        predicate: &dyn Fn(&ServerFileRecord) -> bool,
    ) -> Result<usize, RegistryError> {
        let mut records = self.records.write().expect("registry db lock poisoned");
        let to_remove: Vec<String> = records
            .values()
            .filter(|r| r.modified_at < cutoff && predicate(r))
            .map(|r| r.id.clone())
            .collect();
        for id in &to_remove {
            records.remove(id);
        }
        Ok(to_remove.len())
    }

    fn find_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
        predicate: &dyn Fn(&ServerFileRecord) -> bool,
    ) -> Result<Vec<ServerFileRecord>, RegistryError> {
        let records = self.records.read().expect("registry db lock poisoned");
        Ok(records.values().filter(|r| r.modified_at < cutoff && predicate(r)).cloned().collect())
    }
}
