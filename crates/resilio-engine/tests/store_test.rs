use resilio_engine::store::{DOCUMENT_VERSION, SelectorStore, StoreDocument, StoreOptions};
use resilio_engine::{Origin, SelectorEntry};
use std::time::Duration;
use tempfile::TempDir;

fn options(debounce_ms: u64) -> StoreOptions {
    StoreOptions {
        debounce: Duration::from_millis(debounce_ms),
        max_learned_per_action: 8,
    }
}

fn selectors(store: &SelectorStore, key: &str) -> Vec<String> {
    store
        .candidates(key)
        .into_iter()
        .map(|c| c.selector)
        .collect()
}

#[tokio::test]
async fn test_builtins_come_first_in_declared_order() {
    let store = SelectorStore::in_memory(options(0));
    store.register_builtins("login.button", ["#sbmLogin", "button[type=submit]"]);
    store.record_success("login.button", "#learned", Origin::Learned);
    store.record_success("login.button", "#learned", Origin::Learned);

    assert_eq!(
        selectors(&store, "login.button"),
        vec!["#sbmLogin", "button[type=submit]", "#learned"]
    );
    let first = &store.candidates("login.button")[0];
    assert_eq!(first.origin, Origin::Builtin);
}

#[tokio::test]
async fn test_learned_ranked_by_success_count() {
    let store = SelectorStore::in_memory(options(0));
    store.record_success("search.input", "#a", Origin::Learned);
    store.record_success("search.input", "#b", Origin::Reasoning);
    store.record_success("search.input", "#b", Origin::Reasoning);
    store.record_success("search.input", "#c", Origin::Learned);
    store.record_success("search.input", "#c", Origin::Learned);
    store.record_success("search.input", "#c", Origin::Learned);

    assert_eq!(selectors(&store, "search.input"), vec!["#c", "#b", "#a"]);
}

#[tokio::test]
async fn test_equal_counts_prefer_recent_success() {
    let store = SelectorStore::in_memory(options(0));
    store.record_success("doc.save", "#old", Origin::Learned);
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.record_success("doc.save", "#new", Origin::Learned);

    assert_eq!(selectors(&store, "doc.save"), vec!["#new", "#old"]);
}

#[tokio::test]
async fn test_unknown_failure_is_ignored() {
    let store = SelectorStore::in_memory(options(0));
    store.record_failure("doc.save", "#ghost");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_builtin_failure_is_counted() {
    let store = SelectorStore::in_memory(options(0));
    store.register_builtins("doc.save", ["#btnSalvar"]);
    store.record_failure("doc.save", "#btnSalvar");

    let entry = store.get("doc.save", "#btnSalvar").unwrap();
    assert_eq!(entry.failure_count, 1);
    assert_eq!(entry.origin, Origin::Builtin);
}

#[tokio::test]
async fn test_upsert_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    {
        let store = SelectorStore::open(&path, options(60_000)).await;
        store
            .upsert("login.button", "#acessar", Origin::Reasoning)
            .await
            .unwrap();
        // Dropped without flush.
    }

    let reopened = SelectorStore::open(&path, options(60_000)).await;
    let candidates = reopened.candidates("login.button");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].selector, "#acessar");
    assert_eq!(candidates[0].origin, Origin::Reasoning);
}

#[tokio::test]
async fn test_upsert_keeps_existing_stats() {
    let store = SelectorStore::in_memory(options(0));
    store.record_success("doc.save", "#s", Origin::Reasoning);
    store.upsert("doc.save", "#s", Origin::Learned).await.unwrap();

    let entry = store.get("doc.save", "#s").unwrap();
    assert_eq!(entry.success_count, 1);
    assert_eq!(entry.origin, Origin::Reasoning);
}

#[tokio::test]
async fn test_debounced_successes_coalesce() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let store = SelectorStore::open(&path, options(50)).await;

    for _ in 0..3 {
        store.record_success("login.button", "#acessar", Origin::Learned);
    }
    assert_eq!(store.stats().durable_writes, 0);
    assert!(!path.exists());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(store.stats().durable_writes, 1);
    assert!(!store.stats().pending_writes);
    let doc = StoreDocument::read(&path).unwrap();
    assert_eq!(doc.entries.len(), 1);
    assert_eq!(doc.entries[0].success_count, 3);
}

#[tokio::test]
async fn test_flush_forces_pending_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let store = SelectorStore::open(&path, options(60_000)).await;

    store.record_success("login.button", "#acessar", Origin::Learned);
    assert!(store.stats().pending_writes);
    store.flush().await.unwrap();

    assert!(!store.stats().pending_writes);
    let doc = StoreDocument::read(&path).unwrap();
    assert_eq!(doc.entries[0].success_count, 1);
}

#[tokio::test]
async fn test_two_stores_do_not_lose_counts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.json");
    let a = SelectorStore::open(&path, options(60_000)).await;
    let b = SelectorStore::open(&path, options(60_000)).await;

    a.record_success("doc.save", "#s", Origin::Learned);
    a.record_success("doc.save", "#s", Origin::Learned);
    b.record_success("doc.save", "#s", Origin::Learned);
    b.record_failure("doc.save", "#s");
    b.record_success("doc.save", "#other", Origin::Learned);

    a.flush().await.unwrap();
    b.flush().await.unwrap();

    let reopened = SelectorStore::open(&path, options(60_000)).await;
    let entry = reopened.get("doc.save", "#s").unwrap();
    assert_eq!(entry.success_count, 3);
    assert_eq!(entry.failure_count, 1);
    assert!(reopened.get("doc.save", "#other").is_some());
    // `b` now sees what `a` wrote.
    assert_eq!(b.get("doc.save", "#s").unwrap().success_count, 3);
}

#[tokio::test]
async fn test_prune_keeps_builtins() {
    let store = SelectorStore::in_memory(options(0));
    store.register_builtins("login.button", ["#sbmLogin"]);
    store.record_failure("login.button", "#sbmLogin");
    store.record_success("login.button", "#learned", Origin::Learned);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let removed = store.prune(Duration::from_millis(1)).await.unwrap();

    assert_eq!(removed, 1);
    assert!(store.get("login.button", "#learned").is_none());
    assert!(store.get("login.button", "#sbmLogin").is_some());
}

#[tokio::test]
async fn test_prune_drops_unregistered_builtin_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let stale = chrono::Utc::now() - chrono::Duration::days(60);
    let doc = StoreDocument {
        version: DOCUMENT_VERSION,
        entries: vec![
            SelectorEntry::new("login.button", "#retired", Origin::Builtin, stale),
            SelectorEntry::new("login.button", "#sbmLogin", Origin::Builtin, stale),
        ],
    };
    std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let store = SelectorStore::open(&path, options(60_000)).await;
    store.register_builtins("login.button", ["#sbmLogin"]);
    let removed = store
        .prune(Duration::from_secs(30 * 24 * 3600))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.get("login.button", "#retired").is_none());
    assert!(store.get("login.button", "#sbmLogin").is_some());
    let on_disk = StoreDocument::read(&path).unwrap();
    assert_eq!(on_disk.entries.len(), 1);
}

#[tokio::test]
async fn test_prune_keeps_recent_entries() {
    let store = SelectorStore::in_memory(options(0));
    store.record_success("login.button", "#learned", Origin::Learned);
    let removed = store
        .prune(Duration::from_secs(30 * 24 * 3600))
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn test_learned_cap_evicts_lowest_ranked() {
    let store = SelectorStore::in_memory(StoreOptions {
        debounce: Duration::ZERO,
        max_learned_per_action: 2,
    });
    store.record_success("doc.save", "#a", Origin::Learned);
    store.record_success("doc.save", "#a", Origin::Learned);
    store.record_success("doc.save", "#b", Origin::Learned);
    store.record_success("doc.save", "#c", Origin::Learned);

    let kept = selectors(&store, "doc.save");
    assert_eq!(kept.len(), 2);
    assert!(kept.contains(&"#a".to_string()));
    assert!(kept.contains(&"#c".to_string()));
}

#[tokio::test]
async fn test_upsert_error_is_surfaced() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    let store = SelectorStore::open(blocker.join("cache.json"), options(60_000)).await;
    let result = store.upsert("doc.save", "#s", Origin::Learned).await;

    assert!(result.is_err());
    // The change stays queued for the next write.
    assert!(store.stats().pending_writes);
}

#[tokio::test]
async fn test_failed_debounced_write_is_retried() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("cache-dir");
    std::fs::write(&blocker, "x").unwrap();
    let path = blocker.join("cache.json");

    let store = SelectorStore::open(&path, options(20)).await;
    store.record_success("doc.save", "#s", Origin::Learned);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.stats().pending_writes);

    std::fs::remove_file(&blocker).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!store.stats().pending_writes);
    let doc = StoreDocument::read(&path).unwrap();
    assert_eq!(doc.entries[0].success_count, 1);
}

#[tokio::test]
async fn test_duplicate_records_load_as_one_candidate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let now = chrono::Utc::now();
    let mut first = SelectorEntry::new("k", "#a", Origin::Learned, now);
    first.success_count = 1;
    let mut second = SelectorEntry::new("k", "#a", Origin::Learned, now);
    second.success_count = 2;
    let doc = StoreDocument {
        version: DOCUMENT_VERSION,
        entries: vec![first, second],
    };
    std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let store = SelectorStore::open(&path, options(60_000)).await;
    assert_eq!(selectors(&store, "k"), vec!["#a"]);
    assert_eq!(store.get("k", "#a").unwrap().success_count, 3);

    store.record_success("k", "#a", Origin::Learned);
    store.flush().await.unwrap();
    let on_disk = StoreDocument::read(&path).unwrap();
    assert_eq!(on_disk.entries.len(), 1);
    assert_eq!(on_disk.entries[0].success_count, 4);
}

#[tokio::test]
async fn test_corrupt_document_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = SelectorStore::open(&path, options(60_000)).await;
    assert!(store.is_empty());
    store.upsert("doc.save", "#s", Origin::Learned).await.unwrap();

    let doc = StoreDocument::read(&path).unwrap();
    assert_eq!(doc.entries.len(), 1);
}

#[tokio::test]
async fn test_stats_count_by_origin() {
    let store = SelectorStore::in_memory(options(0));
    store.register_builtins("login.button", ["#sbmLogin"]);
    store.record_success("login.button", "#sbmLogin", Origin::Builtin);
    store.record_success("login.button", "#l", Origin::Learned);
    store.record_success("doc.save", "#r", Origin::Reasoning);

    let stats = store.stats();
    assert_eq!(stats.actions, 2);
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.builtin, 1);
    assert_eq!(stats.learned, 1);
    assert_eq!(stats.reasoning, 1);
}
