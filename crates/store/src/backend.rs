//! Storage backend contract.
//!
//! This module defines the synchronous, capacity-limited key/value substrate the
//! state store writes through to, together with the failure taxonomy the store
//! recovers from.

use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failures surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The write would push the backend past its capacity budget.
    #[error("storage quota exceeded: write needs {needed} of {capacity} bytes")]
    QuotaExceeded {
        /// Total footprint the backend would have after the write, in bytes.
        needed: usize,
        /// Capacity budget of the backend, in bytes.
        capacity: usize,
    },

    /// Underlying I/O failure.
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing data could not be decoded.
    #[error("backend data corrupted: {0}")]
    Corrupted(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl BackendError {
    /// Whether this is the quota-exceeded condition the store recovers from by
    /// sanitizing the value and retrying the write once.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, BackendError::QuotaExceeded { .. })
    }
}

/// Synchronous string key/value storage substrate.
///
/// The store treats implementations as size-limited: `set` fails with
/// [`BackendError::QuotaExceeded`] when a write would exceed the capacity budget,
/// and that failure is the trigger for the store's sanitize-and-retry recovery.
/// All methods take `&self`; implementations provide their own interior locking.
pub trait StorageBackend: Send + Sync {
    /// Reads the serialized value stored under `key`.
    fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Writes `value` under `key`, replacing any existing entry.
    fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Removes the entry under `key`. Removing a missing key is a no-op.
    fn remove(&self, key: &str) -> BackendResult<()>;

    /// Removes every entry.
    fn clear(&self) -> BackendResult<()>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Whether the backend holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored key, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Short backend name for log lines.
    fn name(&self) -> &str;
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> BackendResult<()> {
        (**self).clear()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
