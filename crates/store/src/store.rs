//! The durable key/value cache.
//!
//! [`StateStore`] mediates all reads and writes between application state and
//! the storage backend. Saves land in an in-memory pending table immediately
//! and are committed after a debounce window, with dedup against the last
//! durably-written form and a one-shot sanitize-and-retry under quota
//! pressure. Loads resolve pending state first, so a caller always reads its
//! own writes regardless of durability.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use loandesk_config::{valid_key, StoreConfig};

use crate::backend::StorageBackend;
use crate::sanitize::strip_image_payloads;

/// A value requested to be saved but not yet durably committed.
struct PendingWrite {
    value: Value,
    /// Generation stamp; a scheduled commit only fires if its stamp still
    /// matches, so a superseded timer that races its abort is harmless.
    seq: u64,
}

/// Operation counters exposed for diagnostics and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Debounced save requests accepted.
    pub saves_requested: u64,
    /// Immediate-mode saves accepted.
    pub immediate_saves: u64,
    /// Commits that reached the backend and succeeded.
    pub commits: u64,
    /// Commits skipped because the serialized form was already durable.
    pub dedup_skips: u64,
    /// Load requests served.
    pub loads: u64,
    /// Loads answered from the pending table.
    pub pending_hits: u64,
    /// Loads answered from the backend.
    pub backend_hits: u64,
    /// Loads that fell back to the caller-supplied default.
    pub fallbacks: u64,
    /// Backend entries that failed to parse on load.
    pub parse_failures: u64,
    /// Quota-exceeded commits recovered by the sanitize-and-retry pass.
    pub quota_recoveries: u64,
    /// Commits that failed and left the value memory-resident only.
    pub write_failures: u64,
    /// Pending writes at the time the snapshot was taken.
    pub pending: usize,
}

#[derive(Default)]
struct SharedState {
    pending: HashMap<String, PendingWrite>,
    /// Last successfully committed serialized form per key, used to skip
    /// redundant backend writes.
    committed: HashMap<String, String>,
    timers: HashMap<String, JoinHandle<()>>,
    stats: StoreStats,
    next_seq: u64,
}

struct StoreInner {
    backend: Option<Box<dyn StorageBackend>>,
    config: StoreConfig,
    state: Mutex<SharedState>,
}

/// Debounced, quota-aware cache over a [`StorageBackend`].
///
/// Cheaply cloneable; every clone shares the same pending table, write-cache
/// memo, and timer table, all guarded by a single mutex. Constructed with no
/// backend the store runs in a degraded in-memory-only mode: saves and loads
/// behave identically but nothing is ever durably committed.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Creates a store over `backend` with the default configuration.
    pub fn new<B: StorageBackend + 'static>(backend: B) -> Self {
        Self::from_parts(Some(Box::new(backend)), StoreConfig::default())
    }

    /// Creates a store over `backend` with an explicit configuration.
    pub fn with_config<B: StorageBackend + 'static>(backend: B, config: StoreConfig) -> Self {
        Self::from_parts(Some(Box::new(backend)), config)
    }

    /// Creates a store with no backend: the silent in-memory degraded mode
    /// used when the environment offers no storage substrate.
    pub fn unbacked() -> Self {
        Self::from_parts(None, StoreConfig::default())
    }

    /// Creates an unbacked store with an explicit configuration.
    pub fn unbacked_with_config(config: StoreConfig) -> Self {
        Self::from_parts(None, config)
    }

    fn from_parts(backend: Option<Box<dyn StorageBackend>>, config: StoreConfig) -> Self {
        match &backend {
            Some(backend) => debug!(backend = backend.name(), "state store ready"),
            None => debug!("state store running without a backend, state is memory-only"),
        }
        Self {
            inner: Arc::new(StoreInner {
                backend,
                config,
                state: Mutex::new(SharedState::default()),
            }),
        }
    }

    /// Requests a debounced save of `value` under `key`.
    ///
    /// The pending table is updated before this returns, so a subsequent
    /// [`load`](Self::load) observes `value` immediately. The commit itself is
    /// scheduled one debounce window after this call; saving again to the same
    /// key within the window replaces the scheduled value, and only the last
    /// value is ever written. Commit failures are absorbed and logged, never
    /// surfaced here.
    ///
    /// Outside a tokio runtime there is no timer to schedule on and the commit
    /// runs inline, preserving every invariant except the delay.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) {
        debug_assert!(valid_key(key), "storage keys must be non-empty");
        if !valid_key(key) {
            error!(key, "rejected save with invalid key");
            return;
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                debug_assert!(false, "unserializable value for key {key}: {err}");
                error!(key, %err, "rejected save of unserializable value");
                return;
            }
        };

        let mut state = self.inner.state.lock();
        state.stats.saves_requested += 1;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(key.to_string(), PendingWrite { value, seq });

        // Cancel before rescheduling, so the window restarts from this save.
        if let Some(timer) = state.timers.remove(key) {
            timer.abort();
        }

        if tokio::runtime::Handle::try_current().is_ok() {
            let weak = Arc::downgrade(&self.inner);
            let task_key = key.to_string();
            let window = self.inner.config.debounce_window;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Some(inner) = weak.upgrade() {
                    inner.commit_scheduled(&task_key, seq);
                }
            });
            state.timers.insert(key.to_string(), timer);
        } else {
            self.inner.commit_locked(&mut state, key);
        }
    }

    /// Saves `value` under `key` and commits it synchronously before
    /// returning. Commit failures are absorbed and logged.
    pub fn save_immediate<T: Serialize>(&self, key: &str, value: &T) {
        debug_assert!(valid_key(key), "storage keys must be non-empty");
        if !valid_key(key) {
            error!(key, "rejected save with invalid key");
            return;
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                debug_assert!(false, "unserializable value for key {key}: {err}");
                error!(key, %err, "rejected save of unserializable value");
                return;
            }
        };

        let mut state = self.inner.state.lock();
        state.stats.immediate_saves += 1;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(key.to_string(), PendingWrite { value, seq });
        if let Some(timer) = state.timers.remove(key) {
            timer.abort();
        }
        self.inner.commit_locked(&mut state, key);
    }

    /// Loads the current value for `key`, or `fallback` when nothing is
    /// stored or the stored entry cannot be read.
    ///
    /// Resolution order: the pending table first (read-your-writes, before any
    /// backend touch), then the backend, then `fallback`. Backend and parse
    /// failures degrade to `fallback` with a log line; this never panics and
    /// never returns an error.
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        debug_assert!(valid_key(key), "storage keys must be non-empty");
        if !valid_key(key) {
            error!(key, "rejected load with invalid key");
            return fallback;
        }

        let mut state = self.inner.state.lock();
        state.stats.loads += 1;

        if let Some(pending) = state.pending.get(key) {
            match serde_json::from_value(pending.value.clone()) {
                Ok(value) => {
                    state.stats.pending_hits += 1;
                    return value;
                }
                Err(err) => {
                    warn!(key, %err, "pending value does not match requested type");
                    state.stats.fallbacks += 1;
                    return fallback;
                }
            }
        }

        let Some(backend) = &self.inner.backend else {
            state.stats.fallbacks += 1;
            return fallback;
        };

        match backend.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    // Seed the memo so saving this exact value back is a no-op.
                    state.committed.insert(key.to_string(), raw);
                    state.stats.backend_hits += 1;
                    value
                }
                Err(err) => {
                    warn!(key, %err, "stored entry is corrupted, returning fallback");
                    state.stats.parse_failures += 1;
                    state.stats.fallbacks += 1;
                    fallback
                }
            },
            Ok(None) => {
                state.stats.fallbacks += 1;
                fallback
            }
            Err(err) => {
                warn!(key, %err, "backend read failed, returning fallback");
                state.stats.fallbacks += 1;
                fallback
            }
        }
    }

    /// Removes `key` from the pending table, the write-cache memo, and the
    /// backend. Backend failures are absorbed and logged.
    pub fn remove(&self, key: &str) {
        let mut state = self.inner.state.lock();
        state.pending.remove(key);
        state.committed.remove(key);
        if let Some(timer) = state.timers.remove(key) {
            timer.abort();
        }
        if let Some(backend) = &self.inner.backend {
            if let Err(err) = backend.remove(key) {
                warn!(key, %err, "backend remove failed");
            }
        }
    }

    /// Commits every pending write synchronously, cancelling its timer.
    ///
    /// Idempotent: with nothing pending this is a no-op, and repeated calls
    /// never fail on already-cleared timer handles.
    pub fn flush_pending_writes(&self) {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state);
    }

    /// Clears all in-memory scheduling and cache state without touching the
    /// backend. Test/administrative hook for isolation between runs.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.pending.clear();
        state.committed.clear();
        state.stats = StoreStats::default();
    }

    /// Number of writes currently awaiting commit.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.pending = state.pending.len();
        stats
    }

    /// Name of the configured backend, if any.
    pub fn backend_name(&self) -> Option<&str> {
        self.inner.backend.as_deref().map(|b| b.name())
    }
}

impl StoreInner {
    /// Entry point for a fired debounce timer. The generation check makes a
    /// stale timer a no-op even if it raced its own abort.
    fn commit_scheduled(&self, key: &str, seq: u64) {
        let mut state = self.state.lock();
        if state.pending.get(key).map(|p| p.seq) != Some(seq) {
            return;
        }
        state.timers.remove(key);
        self.commit_locked(&mut state, key);
    }

    /// Commits the pending write for `key`, if any. Caller holds the lock.
    fn commit_locked(&self, state: &mut SharedState, key: &str) {
        let Some(pending) = state.pending.get(key) else {
            return;
        };
        let serialized = match serde_json::to_string(&pending.value) {
            Ok(serialized) => serialized,
            Err(err) => {
                error!(key, %err, "pending value failed to serialize, kept memory-resident");
                state.stats.write_failures += 1;
                return;
            }
        };

        // Unchanged since the last successful commit: skip the backend call
        // but still clear the pending bookkeeping.
        if state.committed.get(key) == Some(&serialized) {
            state.stats.dedup_skips += 1;
            state.pending.remove(key);
            return;
        }

        let Some(backend) = &self.backend else {
            // No backend: the pending entry is the store. Leave it so load
            // keeps serving it; only the timer bookkeeping is done (the timer
            // entry was already cleared by the caller).
            return;
        };

        match backend.set(key, &serialized) {
            Ok(()) => {
                state.stats.commits += 1;
                state.committed.insert(key.to_string(), serialized);
                state.pending.remove(key);
            }
            Err(err) if err.is_quota_exceeded() => {
                let (stripped, replaced) = strip_image_payloads(
                    &pending.value,
                    self.config.sanitize_max_depth,
                    self.config.image_payload_threshold,
                    &self.config.image_placeholder,
                );
                let sanitized = match serde_json::to_string(&stripped) {
                    Ok(sanitized) => sanitized,
                    Err(err) => {
                        error!(key, %err, "sanitized value failed to serialize, kept memory-resident");
                        state.stats.write_failures += 1;
                        return;
                    }
                };

                if state.committed.get(key) == Some(&sanitized) {
                    state.stats.dedup_skips += 1;
                    state.pending.remove(key);
                    return;
                }

                match backend.set(key, &sanitized) {
                    Ok(()) => {
                        warn!(
                            key,
                            replaced, "quota exceeded, committed with image payloads stripped"
                        );
                        state.stats.quota_recoveries += 1;
                        state.stats.commits += 1;
                        state.committed.insert(key.to_string(), sanitized);
                        state.pending.remove(key);
                    }
                    Err(retry_err) => {
                        // Value stays visible via load but is not durable.
                        // Deliberately no further retries.
                        error!(
                            key,
                            %retry_err,
                            "commit failed after sanitization, value kept memory-resident"
                        );
                        state.stats.write_failures += 1;
                    }
                }
            }
            Err(err) => {
                error!(key, %err, "commit failed, value kept memory-resident");
                state.stats.write_failures += 1;
            }
        }
    }

    fn flush_locked(&self, state: &mut SharedState) {
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        let keys: Vec<String> = state.pending.keys().cloned().collect();
        for key in keys {
            self.commit_locked(state, &key);
        }
    }
}

impl Drop for StoreInner {
    /// Best-effort flush at teardown, so process exit commits whatever is
    /// still pending. Debounce tasks hold only a weak reference to the store
    /// and cannot keep it alive past this point.
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            debug!(
                pending = state.pending.len(),
                "flushing pending writes at store teardown"
            );
        }
        self.flush_locked(&mut state);
    }
}
