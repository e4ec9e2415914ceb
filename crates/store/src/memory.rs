//! In-memory storage backend.
//!
//! Serves both as the degraded-environment stand-in when no durable substrate
//! exists and as the capacity-bounded test double for quota behavior.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::backend::{BackendError, BackendResult, StorageBackend};

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    used: usize,
}

/// String key/value backend held entirely in process memory.
///
/// An optional capacity budget bounds the total footprint, computed as the sum
/// of `key.len() + value.len()` over every entry. Writes that would exceed the
/// budget fail with [`BackendError::QuotaExceeded`]; replacing an existing
/// entry only accounts for the footprint delta.
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    capacity: Option<usize>,
}

impl MemoryBackend {
    /// Creates an unbounded in-memory backend.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            capacity: None,
        }
    }

    /// Creates an in-memory backend with a total footprint budget in bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            capacity: Some(bytes),
        }
    }

    /// Creates an in-memory backend bounded to the local-storage class budget
    /// the persistence layer was designed against.
    pub fn bounded() -> Self {
        Self::with_capacity(loandesk_config::DEFAULT_QUOTA_BYTES)
    }

    /// Current total footprint in bytes.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
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
        inner.entries.insert(key.to_string(), value.to_string());
        inner.used = needed;
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.remove(key) {
            inner.used -= key.len() + existing.len();
        }
        Ok(())
    }

    fn clear(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.used = 0;
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
