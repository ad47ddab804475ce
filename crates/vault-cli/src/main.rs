//! CryptVault command-line front-end (spec.md §6.4, §6.A).
//!
//! Thin glue over `vault-store`, `vault-keys`, and `vault-sync`: every
//! command maps directly to one operation on one of those crates and
//! contains no business logic of its own. The collection-sharing/membership
//! subsystem that would normally hand out a `collection_key` is out of
//! scope (spec.md §1); here it is supplied directly, hex-encoded.

mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vault_keys::Secret32;
use vault_store::{FileMetadataStore, LocalFileStore, StorageMode as CoreStorageMode};
use vault_sync::{ServerClient, SyncEngine};

use error::{VaultError, VaultErrorKind};

#[derive(Parser)]
#[command(name = "vault", about = "CryptVault command-line front-end")]
struct Cli {
    /// Application data directory (§6.2): holds the metadata store and the
    /// `files/bin/⟨collection_id⟩` payload tree.
    #[arg(long, env = "VAULT_DATA_DIR", default_value = "./vault-data")]
    data_dir: PathBuf,

    /// Base URL of a running vault-server.
    #[arg(long, env = "VAULT_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,

    /// Bearer identity presented to the server.
    #[arg(long, env = "VAULT_USER_ID")]
    user_id: Option<String>,

    /// Hex-encoded 32-byte collection key.
    #[arg(long, env = "VAULT_COLLECTION_KEY_HEX")]
    collection_key_hex: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageModeArg {
    EncryptedOnly,
    DecryptedOnly,
    Hybrid,
}

impl From<StorageModeArg> for CoreStorageMode {
    fn from(mode: StorageModeArg) -> Self {
        match mode {
            StorageModeArg::EncryptedOnly => CoreStorageMode::EncryptedOnly,
            StorageModeArg::DecryptedOnly => CoreStorageMode::DecryptedOnly,
            StorageModeArg::Hybrid => CoreStorageMode::Hybrid,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Encrypt a local file into the vault (§4.3 `add`).
    Add {
        source: PathBuf,
        collection_id: String,
        owner_id: String,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        #[arg(long, value_enum, default_value_t = StorageModeArg::EncryptedOnly)]
        storage_mode: StorageModeArg,
    },
    /// List files, optionally scoped to one collection.
    List { collection_id: Option<String> },
    /// Show one file's record.
    Get { file_id: String },
    /// Remove a file. Defaults to both local and cloud.
    Delete {
        file_id: String,
        #[arg(long)]
        local_only: bool,
        #[arg(long)]
        cloud_only: bool,
    },
    /// Push a local_only file to the server (§4.5 offload).
    Upload { file_id: String },
    /// Pull a server file's ciphertext to local disk (§4.5 onload).
    Download {
        file_id: String,
        #[arg(long, value_enum, default_value_t = StorageModeArg::EncryptedOnly)]
        storage_mode: StorageModeArg,
    },
    /// `storage_mode -> encrypted_only` (§4.3 lock).
    Lock { file_id: String },
    /// `storage_mode -> hybrid | decrypted_only` (§4.3 unlock).
    Unlock {
        file_id: String,
        #[arg(long, value_enum)]
        target_mode: StorageModeArg,
    },
    /// Rename a file and/or replace its contents in place (§3.3 mutation).
    Update {
        file_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Reconcile one collection against the server's change feed (§4.5).
    Sync { collection_id: String },
}

fn init_tracing() {
    let log_format = std::env::var("VAULT_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vault_cli=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

fn open_store(cli: &Cli) -> Result<LocalFileStore<FileMetadataStore>, VaultError> {
    let metadata_dir = cli.data_dir.join("metadata");
    let payload_root = cli.data_dir.join("files").join("bin");
    std::fs::create_dir_all(&payload_root).map_err(|e| VaultError::new(VaultErrorKind::IoLocal, e.to_string()))?;
    let backend = FileMetadataStore::new(metadata_dir)?;
    Ok(LocalFileStore::new(backend, payload_root))
}

fn require_collection_key(cli: &Cli) -> Result<Secret32, VaultError> {
    let hex_key = cli
        .collection_key_hex
        .as_deref()
        .ok_or_else(|| VaultError::new(VaultErrorKind::Validation, "missing --collection-key-hex"))?;
    let bytes = hex::decode(hex_key)
        .map_err(|e| VaultError::new(VaultErrorKind::Validation, format!("malformed collection key: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| VaultError::new(VaultErrorKind::Validation, "collection key must be exactly 32 bytes"))?;
    Ok(Secret32::new(arr))
}

fn build_client(cli: &Cli) -> Result<ServerClient, VaultError> {
    let user_id = cli
        .user_id
        .as_deref()
        .ok_or_else(|| VaultError::new(VaultErrorKind::Validation, "missing --user-id"))?;
    Ok(ServerClient::new(cli.server_url.clone(), user_id))
}

async fn run(cli: Cli) -> Result<(), VaultError> {
    let store = open_store(&cli)?;

    match &cli.command {
        Command::Add {
            source,
            collection_id,
            owner_id,
            mime_type,
            storage_mode,
        } => {
            let collection_key = require_collection_key(&cli)?;
            let record = store.add(source, collection_id, owner_id, mime_type, (*storage_mode).into(), &collection_key)?;
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::List { collection_id } => {
            let records = store.list(collection_id.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&records).expect("records serialize"));
        }
        Command::Get { file_id } => {
            let record = store.get(file_id)?;
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Delete {
            file_id,
            local_only,
            cloud_only,
        } => {
            let client = build_client(&cli)?;
            let engine = SyncEngine::new(store, client);
            if *local_only {
                engine.local_only_delete(file_id)?;
            } else if *cloud_only {
                engine.cloud_only_delete(file_id).await?;
            } else {
                engine.delete(file_id).await?;
            }
            println!("deleted {file_id}");
        }
        Command::Upload { file_id } => {
            let client = build_client(&cli)?;
            let engine = SyncEngine::new(store, client);
            let record = engine.offload(file_id).await?;
            tracing::info!(file_id = %record.id, "offloaded to server");
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Download { file_id, storage_mode } => {
            let collection_key = require_collection_key(&cli)?;
            let client = build_client(&cli)?;
            let engine = SyncEngine::new(store, client);
            let record = engine.onload(file_id, &collection_key, (*storage_mode).into()).await?;
            tracing::info!(file_id = %record.id, "onloaded from server");
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Lock { file_id } => {
            let collection_key = require_collection_key(&cli)?;
            let record = store.lock(file_id, &collection_key)?;
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Unlock { file_id, target_mode } => {
            let collection_key = require_collection_key(&cli)?;
            let record = store.unlock(file_id, &collection_key, (*target_mode).into())?;
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Update {
            file_id,
            name,
            mime_type,
            source,
        } => {
            let collection_key = require_collection_key(&cli)?;
            let record = if let Some(source) = source {
                let modified_by = cli
                    .user_id
                    .as_deref()
                    .ok_or_else(|| VaultError::new(VaultErrorKind::Validation, "missing --user-id"))?;
                store.update_payload(file_id, source, modified_by, &collection_key)?
            } else {
                store.update_metadata(file_id, &collection_key, name.clone(), mime_type.clone())?
            };
            println!("{}", serde_json::to_string_pretty(&record).expect("FileRecord serializes"));
        }
        Command::Sync { collection_id } => {
            let client = build_client(&cli)?;
            let cursor_path = cli.data_dir.join("cursors").join(format!("{collection_id}.json"));
            let starting_cursor = std::fs::read(&cursor_path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());

            let engine = SyncEngine::new(store, client);
            let next_cursor = engine.reconcile(collection_id, starting_cursor).await?;

            if let Some(cursor) = &next_cursor {
                if let Some(parent) = cursor_path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| VaultError::new(VaultErrorKind::IoLocal, e.to_string()))?;
                }
                let json = serde_json::to_vec(cursor).expect("Cursor serializes");
                std::fs::write(&cursor_path, json)
                    .map_err(|e| VaultError::new(VaultErrorKind::IoLocal, e.to_string()))?;
            }
            tracing::info!(collection_id, cursor = ?next_cursor, "reconcile complete");
            println!("synced {collection_id}");
        }
    }
    Ok(())
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    if let Err(err) = runtime.block_on(run(cli)) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
