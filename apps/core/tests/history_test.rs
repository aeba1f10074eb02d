use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use sift_core::history::{HistoryEntry, HistoryStore, QueryHistory};

#[test]
fn recording_past_capacity_evicts_least_recent() {
    let store = HistoryStore::new(100);
    for i in 0..100 {
        assert_eq!(store.record_at("files", &format!("item-{i}"), 1_000 + i), None);
    }

    let evicted = store.record_at("files", "item-100", 5_000);

    assert_eq!(evicted.as_deref(), Some("item-0"));
    assert_eq!(store.len_for("files"), 100);
    assert!(store.entry("files", "item-0").is_none());
    assert!(store.entry("files", "item-100").is_some());
}

#[test]
fn rerecording_refreshes_recency_and_counts_uses() {
    let store = HistoryStore::new(2);
    store.record_at("apps", "a", 1);
    store.record_at("apps", "b", 2);
    store.record_at("apps", "a", 3);

    let evicted = store.record_at("apps", "c", 4);
    assert_eq!(evicted.as_deref(), Some("b"));
    assert_eq!(
        store.entry("apps", "a"),
        Some(HistoryEntry {
            last_used: 3,
            uses: 2
        })
    );
}

#[test]
fn sources_are_bounded_independently() {
    let store = HistoryStore::new(1);
    store.record_at("apps", "a", 1);
    store.record_at("files", "f", 2);
    assert_eq!(store.len_for("apps"), 1);
    assert_eq!(store.len_for("files"), 1);
    assert_eq!(store.source_ids(), vec!["apps".to_string(), "files".to_string()]);
}

#[test]
fn snapshot_maps_keys_to_last_used() {
    let store = HistoryStore::new(10);
    store.record_at("apps", "a", 7);
    let snapshot = store.snapshot_for("apps");
    assert_eq!(snapshot.get("a"), Some(&7));
    assert!(store.snapshot_for("missing").is_empty());
}

#[test]
fn load_replays_by_timestamp_and_keeps_newest() {
    let store = HistoryStore::new(2);
    let mut items = HashMap::new();
    for (key, last_used) in [("old", 1), ("mid", 2), ("new", 3)] {
        items.insert(key.to_string(), HistoryEntry { last_used, uses: 1 });
    }
    store.load(HashMap::from([("apps".to_string(), items)]));

    assert_eq!(store.len_for("apps"), 2);
    assert!(store.entry("apps", "old").is_none());
    let exported = store.export();
    let keys: Vec<&str> = exported["apps"].iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["mid", "new"]);
}

#[test]
fn concurrent_recording_stays_bounded() {
    let store = Arc::new(HistoryStore::new(50));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    store.record("files", &format!("t{t}-{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.len_for("files"), 50);
}

#[test]
fn query_history_collapses_consecutive_duplicates() {
    let mut history = QueryHistory::new(300);
    history.add_at("vsc", 1);
    history.add_at("vsc", 2);
    history.add_at("notes", 3);
    history.add_at("vsc", 4);

    assert_eq!(history.len(), 3);
    assert_eq!(history.items()[0].executed_epoch_secs, 2);
    assert_eq!(history.last().unwrap().query, "vsc");
}

#[test]
fn query_history_keeps_only_the_newest() {
    let mut history = QueryHistory::new(300);
    for i in 0..310 {
        history.add_at(&format!("q{i}"), i);
    }
    assert_eq!(history.len(), 300);
    assert_eq!(history.items()[0].query, "q10");
}
