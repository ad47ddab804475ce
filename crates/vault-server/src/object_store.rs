//! The object-storage backend (§4.4): a content-addressed black box keyed
//! by `encrypted_file_object_key`. Payload ciphertext transits entirely out
//! of band from the metadata channel, via `PUT`/`GET` against presigned
//! URLs this trait issues.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use crate::error::RegistryError;
use crate::presign::CapabilitySigner;

pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub trait ObjectStore: Send + Sync {
    fn put(&self, object_key: &str, bytes: &[u8]) -> Result<(), RegistryError>;
    fn get(&self, object_key: &str) -> Result<Vec<u8>, RegistryError>;
    fn exists(&self, object_key: &str) -> Result<bool, RegistryError>;
    fn size(&self, object_key: &str) -> Result<u64, RegistryError>;

    /// Best-effort delete: removing an object that does not exist is NOT an
    /// error (§4.4 `delete`, §8.2 scenario 6).
    fn delete(&self, object_key: &str) -> Result<(), RegistryError>;

    fn presign_upload(&self, object_key: &str, ttl: Duration) -> Result<PresignedUrl, RegistryError>;
    fn presign_download(&self, object_key: &str, ttl: Duration) -> Result<PresignedUrl, RegistryError>;

    /// Resolve a capability token issued by this store back to the object
    /// key it authorizes. Exercised by tests simulating the client's
    /// out-of-band `PUT`/`GET` against a presigned URL.
    fn resolve_token(&self, token: &str) -> Result<String, RegistryError>;
}

/// In-memory reference implementation. Production deployments swap this for
/// a real S3/B2-backed `ObjectStore` (see `examples/Lantern-chat-yab2` for
/// the presigned-upload-URL / direct-PUT shape this trait mirrors); nothing
/// elsewhere in the crate depends on the in-memory specifics.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    signer: CapabilitySigner,
    /// Public base URL the `/objects/upload/:token` and
    /// `/objects/download/:token` routes of `http.rs` are reachable at.
    /// Presigned URLs are real HTTP URLs against those routes rather than
    /// an opaque scheme, so a real HTTP client (`vault-sync`'s
    /// `reqwest`-based `ServerClient`, not just an in-process router test)
    /// can `PUT`/`GET` against them directly.
    base_url: String,
}

impl InMemoryObjectStore {
    pub fn new(capability_key: [u8; 32], base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer: CapabilitySigner::new(capability_key),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, object_key: &str, bytes: &[u8]) -> Result<(), RegistryError> {
        let mut objects = self.objects.write().expect("object store lock poisoned");
        objects.insert(object_key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, object_key: &str) -> Result<Vec<u8>, RegistryError> {
        let objects = self.objects.read().expect("object store lock poisoned");
        objects
            .get(object_key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("object {object_key}")))
    }

    fn exists(&self, object_key: &str) -> Result<bool, RegistryError> {
        let objects = self.objects.read().expect("object store lock poisoned");
        Ok(objects.contains_key(object_key))
    }

    fn size(&self, object_key: &str) -> Result<u64, RegistryError> {
        let objects = self.objects.read().expect("object store lock poisoned");
        objects
            .get(object_key)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| RegistryError::NotFound(format!("object {object_key}")))
    }

    fn delete(&self, object_key: &str) -> Result<(), RegistryError> {
        let mut objects = self.objects.write().expect("object store lock poisoned");
        objects.remove(object_key);
        Ok(())
    }

    fn presign_upload(&self, object_key: &str, ttl: Duration) -> Result<PresignedUrl, RegistryError> {
        let (token, expires_at) = self.signer.seal(object_key, ttl)?;
        Ok(PresignedUrl { url: format!("{}/objects/upload/{token}", self.base_url), expires_at })
    }

    fn presign_download(&self, object_key: &str, ttl: Duration) -> Result<PresignedUrl, RegistryError> {
        let (token, expires_at) = self.signer.seal(object_key, ttl)?;
        Ok(PresignedUrl { url: format!("{}/objects/download/{token}", self.base_url), expires_at })
    }

    fn resolve_token(&self, token: &str) -> Result<String, RegistryError> {
        let token = token
            .rsplit('/')
            .next()
            .ok_or_else(|| RegistryError::Validation("malformed presigned url".into()))?;
        self.signer.open(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presigned_upload_then_resolve_roundtrips() {
        let store = InMemoryObjectStore::new([1u8; 32], "http://127.0.0.1:0");
        let presigned = store.presign_upload("users/u1/files/f1", Duration::hours(1)).unwrap();
        let resolved = store.resolve_token(&presigned.url).unwrap();
        assert_eq!(resolved, "users/u1/files/f1");
    }

    #[test]
    fn delete_of_missing_object_is_not_an_error() {
        let store = InMemoryObjectStore::new([1u8; 32], "http://127.0.0.1:0");
        assert!(store.delete("does/not/exist").is_ok());
    }

    #[test]
    fn size_reflects_put_bytes() {
        let store = InMemoryObjectStore::new([1u8; 32], "http://127.0.0.1:0");
        store.put("k", b"hello").unwrap();
        assert_eq!(store.size("k").unwrap(), 5);
        assert!(store.exists("k").unwrap());
    }
}
