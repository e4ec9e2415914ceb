//! # LoanDesk State Store
//!
//! Durable key/value caching for the LoanDesk client state layer.
//!
//! This crate mediates every read and write between application state and a
//! synchronous, size-limited, string-only storage backend. It owns write
//! debouncing, no-op write deduplication, quota-overflow recovery, and
//! read-your-writes consistency, so callers never see backend latency or
//! storage failures.
//!
//! ## Features
//!
//! - **Debounced Commits**: rapid successive saves to a key coalesce into one
//!   backend write, scheduled a fixed window after the final save
//! - **Read-Your-Writes**: a load always reflects the most recent save in this
//!   process, even before the value has reached the backend
//! - **Write Deduplication**: a commit whose serialized form matches the last
//!   durably-written form skips the backend entirely
//! - **Quota Recovery**: quota-exceeded writes are retried once after stripping
//!   oversized embedded image payloads from the value
//! - **Graceful Degradation**: with no backend available the store serves all
//!   state from memory and never surfaces an error
//!
//! ## Architecture
//!
//! The crate is built around a small set of abstractions:
//!
//! - [`StateStore`]: the caller-facing save/load/flush surface
//! - [`StorageBackend`]: the synchronous string key/value substrate contract
//! - [`MemoryBackend`]: in-process backend with an optional byte budget
//! - [`FileBackend`]: whole-map JSON document persisted with atomic rewrites
//! - [`sanitize`]: the lossy transform applied only under quota pressure
//!
//! ## Example Usage
//!
//! ```rust
//! use loandesk_store::{MemoryBackend, StateStore};
//!
//! let store = StateStore::new(MemoryBackend::new());
//!
//! store.save_immediate("loandesk.notes", &vec!["call back the Hendersons"]);
//! let notes: Vec<String> = store.load("loandesk.notes", Vec::new());
//! assert_eq!(notes, vec!["call back the Hendersons"]);
//! ```

#![warn(missing_docs)]

use thiserror::Error;

pub mod backend;
pub mod file;
pub mod memory;
pub mod sanitize;
pub mod store;

pub use backend::{BackendError, BackendResult, StorageBackend};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use store::{StateStore, StoreStats};

pub use loandesk_config::StoreConfig;

/// Errors surfaced by fallible store construction.
///
/// The running store absorbs storage failures internally; this type only
/// appears where a backend is being opened or configured.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend operation failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for fallible store operations.
pub type Result<T> = std::result::Result<T, Error>;
