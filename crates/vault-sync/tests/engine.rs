//! End-to-end Sync Engine tests (§4.5): a real `vault-server` router bound
//! to a loopback port, driven through the actual `reqwest`-based
//! [`ServerClient`], covering onload/offload/reconcile/delete.

use std::net::SocketAddr;
use std::sync::Arc;

use tempfile::TempDir;
use vault_keys::Secret32;
use vault_server::{build_router, build_state, InMemoryAccessControl, InMemoryObjectStore, InMemoryRegistryDb, Permission};
use vault_store::{FileMetadataStore, LocalFileStore, StorageMode, SyncStatus};
use vault_sync::{ServerClient, SyncEngine};

/// Starts a real `vault-server` instance on an ephemeral loopback port and
/// returns its base URL plus the access-control handle tests grant through.
async fn start_server() -> (String, Arc<InMemoryAccessControl>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    let db = Arc::new(InMemoryRegistryDb::new());
    let objects = Arc::new(InMemoryObjectStore::new([7u8; 32], base_url.clone()));
    let access = Arc::new(InMemoryAccessControl::new());
    let state = build_state(db, objects, access.clone(), 1000.0, 1000);
    let app = build_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (base_url, access)
}

fn local_store(dir: &TempDir) -> LocalFileStore<FileMetadataStore> {
    let backend = FileMetadataStore::new(dir.path().join("metadata")).unwrap();
    LocalFileStore::new(backend, dir.path().join("files"))
}

#[tokio::test]
async fn offload_then_onload_round_trips_ciphertext() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([3u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("note.txt");
    std::fs::write(&source, b"the quick brown fox\n").unwrap();

    let uploader_dir = tempfile::tempdir().unwrap();
    let uploader_store = local_store(&uploader_dir);
    let added = uploader_store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let original_ciphertext = std::fs::read(added.encrypted_path.as_ref().unwrap()).unwrap();

    let uploader = SyncEngine::new(uploader_store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = uploader.offload(&added.id).await.unwrap();
    assert_eq!(offloaded.sync_status, SyncStatus::Synced);
    // The server mints its own id; the local record must have adopted it.
    assert_ne!(offloaded.id, added.id);
    assert!(uploader.store().get(&added.id).is_err());

    let downloader_dir = tempfile::tempdir().unwrap();
    let downloader_store = local_store(&downloader_dir);
    let downloader = SyncEngine::new(downloader_store, ServerClient::new(base_url, "u1"));
    let onloaded = downloader
        .onload(&offloaded.id, &collection_key, StorageMode::EncryptedOnly)
        .await
        .unwrap();

    assert_eq!(onloaded.id, offloaded.id);
    assert_eq!(onloaded.sync_status, SyncStatus::Synced);
    let roundtripped = std::fs::read(onloaded.encrypted_path.unwrap()).unwrap();
    assert_eq!(roundtripped, original_ciphertext);
}

#[tokio::test]
async fn onload_with_hybrid_mode_decrypts_to_original_bytes() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([5u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("plan.txt");
    std::fs::write(&source, b"ship it\n").unwrap();

    let uploader_dir = tempfile::tempdir().unwrap();
    let uploader_store = local_store(&uploader_dir);
    let added = uploader_store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let uploader = SyncEngine::new(uploader_store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = uploader.offload(&added.id).await.unwrap();

    let downloader_dir = tempfile::tempdir().unwrap();
    let downloader_store = local_store(&downloader_dir);
    let downloader = SyncEngine::new(downloader_store, ServerClient::new(base_url, "u1"));
    let onloaded = downloader
        .onload(&offloaded.id, &collection_key, StorageMode::Hybrid)
        .await
        .unwrap();

    assert_eq!(onloaded.storage_mode, StorageMode::Hybrid);
    let plaintext = std::fs::read(onloaded.decrypted_path.unwrap()).unwrap();
    assert_eq!(plaintext, b"ship it\n");
}

#[tokio::test]
async fn offloading_twice_under_the_stale_local_id_is_not_found() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([1u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("a.txt");
    std::fs::write(&source, b"a\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));

    engine.offload(&added.id).await.unwrap();
    let err = engine.offload(&added.id).await.unwrap_err();
    assert!(matches!(err, vault_sync::SyncError::NotFound(_)));
}

#[tokio::test]
async fn offload_rejects_a_record_that_is_already_synced() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([1u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("b.txt");
    std::fs::write(&source, b"b\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let mut already_synced = added.clone();
    already_synced.sync_status = SyncStatus::Synced;
    store.put_record(&already_synced).unwrap();

    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));
    let err = engine.offload(&added.id).await.unwrap_err();
    assert!(matches!(err, vault_sync::SyncError::StateViolation(_)));
}

#[tokio::test]
async fn reconcile_pulls_remote_file_as_cloud_only_stub() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([2u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("shared.txt");
    std::fs::write(&source, b"shared contents\n").unwrap();

    let uploader_dir = tempfile::tempdir().unwrap();
    let uploader_store = local_store(&uploader_dir);
    let added = uploader_store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let uploader = SyncEngine::new(uploader_store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = uploader.offload(&added.id).await.unwrap();

    let peer_dir = tempfile::tempdir().unwrap();
    let peer_store = local_store(&peer_dir);
    let peer = SyncEngine::new(peer_store, ServerClient::new(base_url, "u1"));
    let cursor = peer.reconcile("c1", None).await.unwrap();
    assert!(cursor.is_some());

    let pulled = peer.store().get(&offloaded.id).unwrap();
    assert_eq!(pulled.sync_status, SyncStatus::CloudOnly);
    assert!(pulled.encrypted_path.is_none());

    // A second reconcile from the returned cursor sees nothing new.
    let cursor2 = peer.reconcile("c1", cursor).await.unwrap();
    assert!(cursor2.is_none());
}

#[tokio::test]
async fn reconcile_offloads_local_only_files_it_finds() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([8u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("draft.txt");
    std::fs::write(&source, b"draft\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));

    engine.reconcile("c1", None).await.unwrap();

    // The record should no longer be reachable under its original local id:
    // reconcile's offload pass adopted the server-assigned id.
    assert!(engine.store().get(&added.id).is_err());
    let records = engine.store().list(Some("c1")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn cloud_only_delete_demotes_local_copy_instead_of_removing_it() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([4u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("x.txt");
    std::fs::write(&source, b"x\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    engine.cloud_only_delete(&offloaded.id).await.unwrap();

    let demoted = engine.store().get(&offloaded.id).unwrap();
    assert_eq!(demoted.sync_status, SyncStatus::LocalOnly);
    assert!(demoted.encrypted_path.is_some());
}

#[tokio::test]
async fn full_delete_removes_both_local_record_and_cloud_copy() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([6u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("y.txt");
    std::fs::write(&source, b"y\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();
    let payload_path = engine.store().get(&offloaded.id).unwrap().encrypted_path.unwrap();
    assert!(payload_path.exists());

    engine.delete(&offloaded.id).await.unwrap();

    assert!(engine.store().get(&offloaded.id).is_err());
    assert!(!payload_path.exists());
}

#[tokio::test]
async fn push_modified_reseals_metadata_without_reuploading_unchanged_payload() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([11u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("note.txt");
    std::fs::write(&source, b"first draft\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    let renamed = engine
        .store()
        .update_metadata(&offloaded.id, &collection_key, Some("renamed.txt".into()), None)
        .unwrap();
    assert_eq!(renamed.sync_status, SyncStatus::ModifiedLocally);

    let pushed = engine.push_modified(&offloaded.id).await.unwrap();
    assert_eq!(pushed.sync_status, SyncStatus::Synced);

    let client = ServerClient::new(base_url, "u1");
    let server_record = client.get(&offloaded.id).await.unwrap();
    assert_eq!(server_record.version, pushed.version);
    assert_eq!(server_record.encrypted_metadata, pushed.encrypted_metadata);
}

#[tokio::test]
async fn push_modified_reuploads_payload_when_its_size_has_changed() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([12u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("note.txt");
    std::fs::write(&source, b"short\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    let updated_source = source_dir.path().join("note2.txt");
    std::fs::write(&updated_source, b"a much longer replacement body\n").unwrap();
    let updated = engine
        .store()
        .update_payload(&offloaded.id, &updated_source, "u1", &collection_key)
        .unwrap();
    assert_eq!(updated.sync_status, SyncStatus::ModifiedLocally);

    let pushed = engine.push_modified(&offloaded.id).await.unwrap();
    assert_eq!(pushed.sync_status, SyncStatus::Synced);
    assert_eq!(pushed.encrypted_file_size, Some(updated.encrypted_file_size.unwrap()));

    let downloader_dir = tempfile::tempdir().unwrap();
    let downloader_store = local_store(&downloader_dir);
    let downloader = SyncEngine::new(downloader_store, ServerClient::new(base_url, "u1"));
    let onloaded = downloader
        .onload(&pushed.id, &collection_key, StorageMode::Hybrid)
        .await
        .unwrap();
    let plaintext = std::fs::read(onloaded.decrypted_path.unwrap()).unwrap();
    assert_eq!(plaintext, b"a much longer replacement body\n");
}

#[tokio::test]
async fn push_modified_rejects_a_file_that_is_not_modified_locally() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([13u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("note.txt");
    std::fs::write(&source, b"untouched\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    let err = engine.push_modified(&offloaded.id).await.unwrap_err();
    assert!(matches!(err, vault_sync::SyncError::StateViolation(_)));
}

#[tokio::test]
async fn reconcile_pushes_modified_locally_files_it_finds() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([14u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("note.txt");
    std::fs::write(&source, b"v1\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url.clone(), "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    engine
        .store()
        .update_metadata(&offloaded.id, &collection_key, Some("v2.txt".into()), None)
        .unwrap();

    engine.reconcile("c1", None).await.unwrap();

    let record = engine.store().get(&offloaded.id).unwrap();
    assert_eq!(record.sync_status, SyncStatus::Synced);
    assert_eq!(record.cached_name.as_deref(), Some("v2.txt"));

    let client = ServerClient::new(base_url, "u1");
    let server_record = client.get(&offloaded.id).await.unwrap();
    assert_eq!(server_record.version, record.version);
}

#[tokio::test]
async fn local_only_delete_rejects_a_synced_file() {
    let (base_url, access) = start_server().await;
    access.grant("c1", "u1", Permission::ReadWrite);

    let collection_key = Secret32::new([9u8; 32]);
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("z.txt");
    std::fs::write(&source, b"z\n").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);
    let added = store
        .add(&source, "c1", "u1", "text/plain", StorageMode::EncryptedOnly, &collection_key)
        .unwrap();
    let engine = SyncEngine::new(store, ServerClient::new(base_url, "u1"));
    let offloaded = engine.offload(&added.id).await.unwrap();

    let err = engine.local_only_delete(&offloaded.id).unwrap_err();
    assert!(matches!(err, vault_sync::SyncError::StateViolation(_)));
}
