//! File-backed replication gateway.
//!
//! A single-node stand-in for the replicated log: each committed record is
//! one line of compact JSON, appended and `fsync`ed before the proposal is
//! acknowledged. [`FileJournal::load`] reads the records back in commit
//! order so a fresh store can be rebuilt with
//! [`AuthorizationStore::replay`](crate::AuthorizationStore::replay).
//!
//! The file only ever holds whole records once a proposal has returned: a
//! torn tail left by a crash is cut off when the journal is reopened, and a
//! failed append is rolled back before the error reaches the caller.

use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keyward_core::{Error, Result};
use log::{error, warn};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::gateway::ReplicationGateway;
use crate::operation::{Operation, Proposal, decode_operation};

/// Append-only JSON-lines journal.
pub struct FileJournal {
    path: PathBuf,
    tail: Mutex<Tail>,
    #[cfg(test)]
    fail_sync: AtomicBool,
}

/// The open file and the length of its committed prefix.
struct Tail {
    file: File,
    len: u64,
}

impl FileJournal {
    /// Open (or create) the journal at `path` for appending.
    ///
    /// Bytes after the last newline belong to a record that never
    /// committed and are truncated away.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::io_with_path(e, &path))?;

        let bytes = fs::read(&path)
            .await
            .map_err(|e| Error::io_with_path(e, &path))?;
        let len = committed_len(&bytes);
        if len < bytes.len() as u64 {
            warn!(
                "Truncating {} torn bytes from {}",
                bytes.len() as u64 - len,
                path.display()
            );
            file.set_len(len)
                .await
                .map_err(|e| Error::io_with_path(e, &path))?;
            file.sync_data()
                .await
                .map_err(|e| Error::io_with_path(e, &path))?;
        }

        Ok(Self {
            path,
            tail: Mutex::new(Tail { file, len }),
            #[cfg(test)]
            fail_sync: AtomicBool::new(false),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every committed record in commit order.
    ///
    /// A missing file is an empty log. A torn final line (one that was never
    /// newline-terminated) is skipped with a warning; any other malformed
    /// line is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Vec<Operation>> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;

        let complete = content.ends_with('\n');
        let lines: Vec<&str> = content.lines().collect();
        let mut operations = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match decode_operation(line.as_bytes()) {
                Ok(op) => operations.push(op),
                Err(e) if !complete && idx + 1 == lines.len() => {
                    warn!(
                        "Skipping torn final record in {} (line {}): {e}",
                        path.display(),
                        idx + 1
                    );
                }
                Err(Error::Serialization(msg)) => {
                    return Err(Error::serialization(format!(
                        "{} line {}: {msg}",
                        path.display(),
                        idx + 1
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(operations)
    }

    /// Make the next append fail after its bytes reach the file.
    #[cfg(test)]
    fn fail_next_sync(&self) {
        self.fail_sync.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn injected_failure(&self) -> Option<std::io::Error> {
        self.fail_sync
            .swap(false, Ordering::SeqCst)
            .then(|| std::io::Error::other("injected sync failure"))
    }

    #[cfg(not(test))]
    fn injected_failure(&self) -> Option<std::io::Error> {
        None
    }

    async fn sync(&self, file: &File) -> std::io::Result<()> {
        if let Some(e) = self.injected_failure() {
            return Err(e);
        }
        file.sync_data().await
    }
}

/// Length of the newline-terminated prefix of `bytes`.
fn committed_len(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |idx| idx as u64 + 1)
}

#[async_trait]
impl ReplicationGateway for FileJournal {
    async fn propose(&self, proposal: Proposal) -> Result<()> {
        let kind = proposal.kind;
        let mut line = proposal.payload;
        line.push(b'\n');

        let mut tail = self.tail.lock().await;
        let start = tail.len;
        let written = async {
            tail.file.write_all(&line).await?;
            self.sync(&tail.file).await
        }
        .await;

        match written {
            Ok(()) => {
                tail.len = start + line.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Drop whatever part of the record reached the file so it is
                // never replayed.
                let rollback = async {
                    tail.file.set_len(start).await?;
                    tail.file.sync_data().await
                }
                .await;
                if let Err(rollback) = rollback {
                    error!(
                        "Failed to roll back {} to {start} bytes: {rollback}",
                        self.path.display()
                    );
                }
                Err(Error::durability(kind.as_str(), e))
            }
        }
    }
}
