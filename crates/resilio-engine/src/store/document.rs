//! On-disk form of the selector cache.
//!
//! One pretty-printed JSON document per cache. Writers take an exclusive
//! advisory lock on a sibling `.lock` file, re-read the document, merge their
//! pending changes, write a temporary sibling and rename it into place.

use super::pending::PendingWrites;
use resilio_common::SelectorEntry;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock {}: {reason}", path.display())]
    Lock { path: PathBuf, reason: String },

    #[error("Corrupt selector cache {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode selector cache: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Persistence task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<SelectorEntry>,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            entries: Vec::new(),
        }
    }
}

impl StoreDocument {
    /// Parse a document, folding duplicate `(action_key, selector)` records
    /// into one.
    pub fn parse(path: &Path, content: &str) -> Result<Self, PersistenceError> {
        let mut doc: Self =
            serde_json::from_str(content).map_err(|source| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        let before = doc.entries.len();
        doc.entries = coalesce(doc.entries);
        if doc.entries.len() < before {
            warn!(
                path = %path.display(),
                merged = before - doc.entries.len(),
                "merged duplicate selector records"
            );
        }
        Ok(doc)
    }

    /// Read the document at `path`. A missing file is an empty document.
    pub fn read(path: &Path) -> Result<Self, PersistenceError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Fold records for the same selector: counts add up, timestamps keep the
/// latest use and the earliest discovery, the first record's origin wins.
fn coalesce(entries: Vec<SelectorEntry>) -> Vec<SelectorEntry> {
    let mut merged: Vec<SelectorEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match merged
            .iter_mut()
            .find(|e| e.is(&entry.action_key, &entry.selector))
        {
            Some(kept) => {
                kept.success_count += entry.success_count;
                kept.failure_count += entry.failure_count;
                kept.last_used_at = kept.last_used_at.max(entry.last_used_at);
                kept.last_success_at = kept.last_success_at.max(entry.last_success_at);
                kept.discovered_at = kept.discovered_at.min(entry.discovered_at);
            }
            None => merged.push(entry),
        }
    }
    merged
}

/// Merge `pending` into the document at `path` and write it back.
///
/// Returns the merged entries, which include changes made by other processes
/// since this one last read the document.
pub(crate) fn merge_and_write(
    path: &Path,
    pending: &PendingWrites,
) -> Result<Vec<SelectorEntry>, PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let _lock = lock::exclusive(path)?;

    let current = match StoreDocument::read(path) {
        Ok(doc) => doc.entries,
        Err(e @ PersistenceError::Corrupt { .. }) => {
            warn!(error = %e, "replacing unreadable selector cache");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let document = StoreDocument {
        version: DOCUMENT_VERSION,
        entries: pending.apply_to(current),
    };
    write_atomic(path, &document)?;
    Ok(document.entries)
}

fn write_atomic(path: &Path, document: &StoreDocument) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(document)?;
    let tmp_path = sibling(path, "tmp");

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(io_error(&tmp_path))?;
    file.write_all(json.as_bytes()).map_err(io_error(&tmp_path))?;
    file.sync_all().map_err(io_error(&tmp_path))?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + use<> {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "selector-cache.json".into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(unix)]
mod lock {
    use super::{PersistenceError, sibling};
    use nix::fcntl::{Flock, FlockArg};
    use std::fs::{File, OpenOptions};
    use std::path::Path;

    /// Held for the duration of a read-merge-write; released on drop.
    pub(crate) struct FileLock {
        _flock: Flock<File>,
    }

    pub(crate) fn exclusive(path: &Path) -> Result<FileLock, PersistenceError> {
        let lock_path = sibling(path, "lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| PersistenceError::Io {
                path: lock_path.clone(),
                source,
            })?;
        let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            PersistenceError::Lock {
                path: lock_path,
                reason: errno.to_string(),
            }
        })?;
        Ok(FileLock { _flock: flock })
    }
}

#[cfg(not(unix))]
mod lock {
    use super::PersistenceError;
    use std::path::Path;

    // Only the atomic rename protects concurrent writers here.
    pub(crate) struct FileLock;

    pub(crate) fn exclusive(_path: &Path) -> Result<FileLock, PersistenceError> {
        Ok(FileLock)
    }
}
