//! # LoanDesk-RS: Client-State Persistence for the LoanDesk Suite
//!
//! The Rust persistence layer behind the LoanDesk mortgage-officer
//! productivity suite: clients and deals, daily planner, compensation
//! tracking, and calendar state, all kept durable through one debounced,
//! quota-aware key/value cache.
//!
//! ## Features
//!
//! - **Write Coalescing**: rapid successive saves to a key collapse into one
//!   backend commit after a fixed debounce window
//! - **Read-Your-Writes**: loads always reflect the most recent save in this
//!   process, durable or not
//! - **Quota Recovery**: quota-exceeded commits retry once with oversized
//!   embedded image payloads stripped
//! - **Silent Degradation**: storage failures are absorbed and logged, never
//!   surfaced to the caller
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loandesk::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> loandesk::store::Result<()> {
//!     let backend = FileBackend::open("loandesk-state.json")?;
//!     let store = StateStore::new(backend);
//!
//!     // Saves coalesce; only the last value within the window is committed.
//!     store.save(keys::NOTES, &json!({"value": "call the Hendersons"}));
//!     let notes = store.load(keys::NOTES, json!(null));
//!     println!("{notes}");
//!
//!     store.flush_pending_writes();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The implementation is organized into two crates:
//!
//! - [`loandesk_config`] - storage key catalog and persistence tunables
//! - [`loandesk_store`] - the durable key/value cache and its backends

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export all public APIs from the member crates
pub use loandesk_config as config;
pub use loandesk_store as store;

/// Common imports for LoanDesk development
pub mod prelude {
    pub use crate::config::{keys, StoreConfig};
    pub use crate::store::{
        BackendError, FileBackend, MemoryBackend, StateStore, StorageBackend, StoreStats,
    };
}

/// Version of the LoanDesk persistence layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
