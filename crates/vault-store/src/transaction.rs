//! Per-process write transaction guard (§4.3 Transactions, §5 Client
//! concurrency model).
//!
//! A command that writes both on-disk payloads and a metadata record opens
//! one [`Transaction`], tracks every payload path it writes, and either
//! [`Transaction::commit`]s (nothing to clean up) or lets the guard drop
//! without committing — at which point every tracked path is unlinked
//! before the error propagates. This implements the compensating-cleanup
//! rule: "any failure before record insertion MUST remove any on-disk
//! artefacts it created."

use std::path::PathBuf;

pub struct Transaction {
    written_paths: Vec<PathBuf>,
    committed: bool,
}

impl Transaction {
    pub fn begin() -> Self {
        Self {
            written_paths: Vec::new(),
            committed: false,
        }
    }

    /// Record a payload path this transaction has written to disk, so it
    /// can be unwound if the transaction never commits.
    pub fn track_write(&mut self, path: PathBuf) {
        self.written_paths.push(path);
    }

    /// Finalize the transaction: no cleanup happens on drop.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Explicit rollback: unlinks tracked paths now rather than waiting for
    /// drop. Equivalent to simply dropping the transaction, but makes the
    /// intent visible at the call site.
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.written_paths {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), %err, "compensating cleanup failed");
                }
            }
        }
    }
}
