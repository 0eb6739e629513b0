//! Blob-store backends.
//!
//! The tracker sits on a deliberately small storage surface: `put`, `get`,
//! and `list` over string keys, with per-key atomic put. Everything written
//! through it is content-addressed, so concurrent writers for the same key
//! produce byte-identical payloads and last-writer-wins is harmless.
//!
//! Two backends ship with the library: [`MemoryBlobStore`] for tests and
//! short-lived processes, and [`FsBlobStore`] for a local directory tree.
//! Object storage belongs in a downstream crate implementing [`BlobStore`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Errors surfaced by blob-store backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// An I/O operation failed.
    #[error("storage I/O failure on key '{key}': {source}")]
    Io {
        /// The key being read or written.
        key: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key is not usable by this backend.
    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },

    /// A backend-specific failure.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Get/put/list primitives over string keys.
///
/// Implementations must provide per-key atomic put: a reader never observes
/// a partially written value.
pub trait BlobStore: Send + Sync {
    /// Writes bytes under a key, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Reads the bytes under a key, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Lists all keys starting with a prefix, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on backend failure.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Checks a key for path traversal and shape problems.
///
/// Keys are slash-separated relative paths; each segment must be non-empty
/// and must not be `.` or `..`.
fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "empty key",
        });
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "absolute path",
        });
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "empty, '.', or '..' path segment",
            });
        }
    }
    Ok(())
}

/// In-memory blob store.
///
/// Clones share the same underlying map, mirroring how a handle to a remote
/// store behaves.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no blobs.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }
}

impl Clone for MemoryBlobStore {
    fn clone(&self) -> Self {
        Self {
            blobs: Arc::clone(&self.blobs),
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().expect("lock poisoned");
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.get(key).cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Filesystem blob store rooted at a directory.
///
/// Keys map to relative paths under the root. Writes go through a temp file
/// in the destination directory followed by a rename, which is the per-key
/// atomic put the tracker relies on.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the root cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    fn collect_keys(
        &self,
        dir: &Path,
        rel: &str,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<(), StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StorageError::Io {
                    key: rel.to_string(),
                    source,
                })
            },
        };
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                key: rel.to_string(),
                source,
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let child_rel = if rel.is_empty() {
                name.to_string()
            } else {
                format!("{rel}/{name}")
            };
            let file_type = entry.file_type().map_err(|source| StorageError::Io {
                key: child_rel.clone(),
                source,
            })?;
            if file_type.is_dir() {
                self.collect_keys(&entry.path(), &child_rel, prefix, out)?;
            } else if child_rel.starts_with(prefix) {
                out.push(child_rel);
            }
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let parent = path.parent().ok_or_else(|| StorageError::InvalidKey {
            key: key.to_string(),
            reason: "key has no parent directory",
        })?;
        fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| {
            StorageError::Io {
                key: key.to_string(),
                source,
            }
        })?;
        tmp.write_all(bytes).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| StorageError::Io {
            key: key.to_string(),
            source: e.error,
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let root = self.root.clone();
        self.collect_keys(&root, "", prefix, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}
