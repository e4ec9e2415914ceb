//! Integration tests for the state store debounce, coalescing, and recovery
//! behavior, driven on a paused tokio clock for deterministic timing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use loandesk_store::{
    BackendResult, MemoryBackend, StateStore, StorageBackend, StoreConfig,
};

const WINDOW_MS: u64 = 300;

fn test_config() -> StoreConfig {
    StoreConfig {
        debounce_window: Duration::from_millis(WINDOW_MS),
        ..StoreConfig::default()
    }
}

fn create_test_store() -> (StateStore, Arc<MemoryBackend>) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("loandesk_store=debug")
        .try_init();
    let backend = Arc::new(MemoryBackend::new());
    let store = StateStore::with_config(backend.clone(), test_config());
    (store, backend)
}

/// Wraps a backend and counts the writes that reach it.
struct CountingBackend<B> {
    inner: B,
    sets: AtomicUsize,
}

impl<B> CountingBackend<B> {
    fn new(inner: B) -> Self {
        Self {
            inner,
            sets: AtomicUsize::new(0),
        }
    }

    fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl<B: StorageBackend> StorageBackend for CountingBackend<B> {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        self.inner.remove(key)
    }

    fn clear(&self) -> BackendResult<()> {
        self.inner.clear()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

async fn past_window() {
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_debounce_commits_only_the_final_value() {
    let (store, backend) = create_test_store();

    store.save("loandesk.notes", &json!({"value": "first"}));
    store.save("loandesk.notes", &json!({"value": "second"}));

    // Nothing durable before the window elapses.
    assert_eq!(backend.get("loandesk.notes").unwrap(), None);
    assert_eq!(store.pending_count(), 1);

    past_window().await;

    assert_eq!(
        backend.get("loandesk.notes").unwrap(),
        Some(r#"{"value":"second"}"#.to_string())
    );
    assert_eq!(store.pending_count(), 0);
    // The superseded value never reached the backend.
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_load_observes_pending_value_before_commit() {
    let (store, backend) = create_test_store();
    backend
        .set("loandesk.notes", r#"{"value":"stale"}"#)
        .unwrap();

    store.save("loandesk.notes", &json!({"value": "fresh"}));

    // Read-your-writes: the pending value wins over the backend's entry.
    assert_eq!(
        store.load("loandesk.notes", json!(null)),
        json!({"value": "fresh"})
    );
}

#[tokio::test(start_paused = true)]
async fn test_each_save_restarts_the_window() {
    let (store, backend) = create_test_store();

    store.save("loandesk.notes", &json!(1));
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.save("loandesk.notes", &json!(2));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 400ms after the first save, past its deadline, but only 200ms after the
    // second: the first timer was cancelled, so nothing is durable yet.
    assert_eq!(backend.get("loandesk.notes").unwrap(), None);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.get("loandesk.notes").unwrap(), Some("2".to_string()));
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_commits_eagerly_and_cancels_timers() {
    let (store, backend) = create_test_store();

    store.save("loandesk.manual_deals", &json!({"id": "deal-1"}));
    store.flush_pending_writes();

    assert_eq!(
        backend.get("loandesk.manual_deals").unwrap(),
        Some(r#"{"id":"deal-1"}"#.to_string())
    );
    assert_eq!(store.pending_count(), 0);

    // The cancelled timer firing later must not write again.
    past_window().await;
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_is_idempotent() {
    let (store, _backend) = create_test_store();

    store.save("loandesk.notes", &json!("x"));
    store.flush_pending_writes();
    store.flush_pending_writes();
    store.flush_pending_writes();

    assert_eq!(store.stats().commits, 1);
    assert_eq!(store.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_identical_value_committed_once() {
    let backend = Arc::new(CountingBackend::new(MemoryBackend::new()));
    let store = StateStore::with_config(backend.clone(), test_config());

    store.save("loandesk.rates", &json!({"thirty_year": 6.125}));
    past_window().await;
    store.save("loandesk.rates", &json!({"thirty_year": 6.125}));
    past_window().await;

    assert_eq!(backend.set_calls(), 1);
    let stats = store.stats();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.dedup_skips, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cross_key_commits_are_independent() {
    let (store, backend) = create_test_store();

    store.save("loandesk.notes", &json!("note"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.save("loandesk.rates", &json!("rate"));

    // The second key's save must not delay the first key's commit.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.get("loandesk.notes").unwrap(), Some(r#""note""#.to_string()));
    assert_eq!(backend.get("loandesk.rates").unwrap(), None);

    past_window().await;
    assert_eq!(backend.get("loandesk.rates").unwrap(), Some(r#""rate""#.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_quota_recovery_during_debounced_commit() {
    let backend = Arc::new(MemoryBackend::with_capacity(1024));
    let store = StateStore::with_config(backend.clone(), test_config());

    let mut photo = String::from("data:image/png;base64,");
    photo.push_str(&"A".repeat(4000));
    store.save(
        "loandesk.clients",
        &json!([{"name": "Ada", "photo": photo}]),
    );
    past_window().await;

    let raw = backend.get("loandesk.clients").unwrap().unwrap();
    assert_eq!(
        raw,
        r#"[{"name":"Ada","photo":"[image removed]"}]"#.to_string()
    );
    assert_eq!(store.stats().quota_recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_scheduled_commits() {
    let (store, backend) = create_test_store();

    store.save("loandesk.notes", &json!("doomed"));
    store.reset();
    past_window().await;

    assert_eq!(backend.get("loandesk.notes").unwrap(), None);
    assert_eq!(store.stats().commits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_flushes_pending_writes() {
    let backend = Arc::new(MemoryBackend::new());
    {
        let store = StateStore::with_config(backend.clone(), test_config());
        store.save("loandesk.daily_plan", &json!({"focus": "pipeline review"}));
        // Dropped before the window elapses.
    }

    assert_eq!(
        backend.get("loandesk.daily_plan").unwrap(),
        Some(r#"{"focus":"pipeline review"}"#.to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_unbacked_store_round_trips_without_durability() {
    let store = StateStore::unbacked_with_config(test_config());

    store.save_immediate("loandesk.notes", &json!({"value": "memory only"}));
    assert_eq!(
        store.load("loandesk.notes", json!(null)),
        json!({"value": "memory only"})
    );

    // Debounced saves behave the same way, with nothing to commit to.
    store.save("loandesk.rates", &json!(6.5));
    past_window().await;
    assert_eq!(store.load("loandesk.rates", json!(0)), json!(6.5));
}

#[tokio::test(start_paused = true)]
async fn test_typed_round_trip_through_backend() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct ManualDeal {
        id: String,
        amount: u64,
        closed: bool,
    }

    let (store, backend) = create_test_store();
    let deal = ManualDeal {
        id: "deal-1".to_string(),
        amount: 425_000,
        closed: false,
    };

    store.save("loandesk.manual_deals", &vec![deal.clone()]);
    past_window().await;

    // A fresh store over the same backend sees the committed form.
    let fresh = StateStore::with_config(backend.clone(), test_config());
    let loaded: Vec<ManualDeal> = fresh.load("loandesk.manual_deals", Vec::new());
    assert_eq!(loaded, vec![deal]);
}
