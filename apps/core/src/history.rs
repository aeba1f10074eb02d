use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_PER_SOURCE: usize = 100;
pub const DEFAULT_QUERY_HISTORY_LIMIT: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub last_used: i64,
    pub uses: u32,
}

type SourceHistory = Arc<Mutex<LruCache<String, HistoryEntry>>>;

// One lock per source: recording for one source never waits on readers of another.
pub struct HistoryStore {
    capacity: NonZeroUsize,
    sources: RwLock<HashMap<String, SourceHistory>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn record(&self, source_id: &str, item_key: &str) -> Option<String> {
        self.record_at(source_id, item_key, now_epoch_secs())
    }

    pub fn record_at(&self, source_id: &str, item_key: &str, epoch_secs: i64) -> Option<String> {
        let submap = self.submap(source_id);
        let mut entries = submap.lock();
        let uses = entries.peek(item_key).map(|entry| entry.uses).unwrap_or(0);
        let updated = HistoryEntry {
            last_used: epoch_secs,
            uses: uses.saturating_add(1),
        };
        match entries.push(item_key.to_string(), updated) {
            Some((evicted, _)) if evicted != item_key => Some(evicted),
            _ => None,
        }
    }

    pub fn entry(&self, source_id: &str, item_key: &str) -> Option<HistoryEntry> {
        let sources = self.sources.read();
        let submap = sources.get(source_id)?;
        let entries = submap.lock();
        entries.peek(item_key).copied()
    }

    pub fn len_for(&self, source_id: &str) -> usize {
        self.sources
            .read()
            .get(source_id)
            .map(|submap| submap.lock().len())
            .unwrap_or(0)
    }

    pub fn snapshot_for(&self, source_id: &str) -> HashMap<String, i64> {
        let sources = self.sources.read();
        let Some(submap) = sources.get(source_id) else {
            return HashMap::new();
        };
        let entries = submap.lock();
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_used))
            .collect()
    }

    pub fn export(&self) -> HashMap<String, Vec<(String, HistoryEntry)>> {
        let sources = self.sources.read();
        sources
            .iter()
            .map(|(source_id, submap)| {
                let entries = submap.lock();
                let ordered = entries
                    .iter()
                    .rev()
                    .map(|(key, entry)| (key.clone(), *entry))
                    .collect();
                (source_id.clone(), ordered)
            })
            .collect()
    }

    // Replays oldest first so the newest entries survive the bound.
    pub fn load(&self, stored: HashMap<String, HashMap<String, HistoryEntry>>) {
        let mut loaded = HashMap::with_capacity(stored.len());
        for (source_id, items) in stored {
            let mut items: Vec<(String, HistoryEntry)> = items.into_iter().collect();
            items.sort_by(|a, b| a.1.last_used.cmp(&b.1.last_used).then_with(|| a.0.cmp(&b.0)));
            let mut entries = LruCache::new(self.capacity);
            for (key, entry) in items {
                entries.push(key, entry);
            }
            loaded.insert(source_id, Arc::new(Mutex::new(entries)));
        }
        *self.sources.write() = loaded;
    }

    pub fn clear_source(&self, source_id: &str) {
        self.sources.write().remove(source_id);
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn submap(&self, source_id: &str) -> SourceHistory {
        if let Some(submap) = self.sources.read().get(source_id) {
            return Arc::clone(submap);
        }
        let mut sources = self.sources.write();
        Arc::clone(
            sources
                .entry(source_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(LruCache::new(self.capacity)))),
        )
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_PER_SOURCE)
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("capacity", &self.capacity)
            .field("sources", &self.source_ids())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHistoryItem {
    pub query: String,
    pub executed_epoch_secs: i64,
}

#[derive(Debug, Clone)]
pub struct QueryHistory {
    limit: usize,
    items: Vec<QueryHistoryItem>,
}

impl QueryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            items: Vec::new(),
        }
    }

    pub fn add(&mut self, query: &str) {
        self.add_at(query, now_epoch_secs());
    }

    pub fn add_at(&mut self, query: &str, epoch_secs: i64) {
        if query.is_empty() {
            return;
        }
        if let Some(last) = self.items.last_mut() {
            if last.query == query {
                last.executed_epoch_secs = epoch_secs;
                return;
            }
        }
        self.items.push(QueryHistoryItem {
            query: query.to_string(),
            executed_epoch_secs: epoch_secs,
        });
        if self.items.len() > self.limit {
            let overflow = self.items.len() - self.limit;
            self.items.drain(..overflow);
        }
    }

    pub fn items(&self) -> &[QueryHistoryItem] {
        &self.items
    }

    pub fn last(&self) -> Option<&QueryHistoryItem> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_HISTORY_LIMIT)
    }
}

pub(crate) fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
