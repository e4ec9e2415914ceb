//! File-based storage backend.
//!
//! Persists the whole key/value map as a single JSON document. Every mutation
//! rewrites the document through a sibling temp file and an atomic rename, so
//! a crash mid-write never leaves a half-written map behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::backend::{BackendError, BackendResult, StorageBackend};

struct FileInner {
    entries: BTreeMap<String, String>,
    used: usize,
}

/// String key/value backend persisted as one JSON document on disk.
///
/// Capacity accounting matches [`MemoryBackend`](crate::MemoryBackend): the
/// footprint is the sum of `key.len() + value.len()` over every entry, and a
/// write pushing past the budget fails with [`BackendError::QuotaExceeded`].
pub struct FileBackend {
    path: PathBuf,
    capacity: Option<usize>,
    inner: Mutex<FileInner>,
}

impl FileBackend {
    /// Opens an unbounded file backend at `path`.
    ///
    /// A missing file starts the backend empty. An unparseable file is moved
    /// aside to `<path>.corrupt` and the backend starts empty; per-entry
    /// corruption remains the store's concern on load.
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        Self::open_inner(path.into(), None)
    }

    /// Opens a file backend with a total footprint budget in bytes.
    pub fn open_with_capacity(path: impl Into<PathBuf>, bytes: usize) -> crate::Result<Self> {
        Self::open_inner(path.into(), Some(bytes))
    }

    fn open_inner(path: PathBuf, capacity: Option<usize>) -> crate::Result<Self> {
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(entries) => entries,
                Err(err) => {
                    let aside = corrupt_path(&path);
                    warn!(
                        path = %path.display(),
                        aside = %aside.display(),
                        %err,
                        "storage file unparseable, moving aside and starting empty"
                    );
                    fs::rename(&path, &aside).map_err(BackendError::Io)?;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(BackendError::Io(err).into()),
        };

        let used = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
        info!(path = %path.display(), entries = entries.len(), "opened file backend");

        Ok(Self {
            path,
            capacity,
            inner: Mutex::new(FileInner { entries, used }),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, inner: &FileInner) -> BackendResult<()> {
        let text = serde_json::to_string(&inner.entries)
            .map_err(|err| BackendError::Backend(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".corrupt");
    PathBuf::from(name)
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let replaced = inner
            .entries
            .get(key)
            .map(|existing| key.len() + existing.len())
            .unwrap_or(0);
        let needed = inner.used - replaced + key.len() + value.len();
        if let Some(capacity) = self.capacity {
            if needed > capacity {
                return Err(BackendError::QuotaExceeded { needed, capacity });
            }
        }

        let previous = inner.entries.insert(key.to_string(), value.to_string());
        let previous_used = inner.used;
        inner.used = needed;
        if let Err(err) = self.persist(&inner) {
            // Keep the in-memory map consistent with what is on disk.
            match previous {
                Some(old) => {
                    inner.entries.insert(key.to_string(), old);
                }
                None => {
                    inner.entries.remove(key);
                }
            }
            inner.used = previous_used;
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.remove(key) {
            let previous_used = inner.used;
            inner.used -= key.len() + existing.len();
            if let Err(err) = self.persist(&inner) {
                inner.entries.insert(key.to_string(), existing);
                inner.used = previous_used;
                return Err(err);
            }
        }
        Ok(())
    }

    fn clear(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let entries = std::mem::take(&mut inner.entries);
        let previous_used = inner.used;
        inner.used = 0;
        if let Err(err) = self.persist(&inner) {
            inner.entries = entries;
            inner.used = previous_used;
            return Err(err);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    fn name(&self) -> &str {
        "file"
    }
}
