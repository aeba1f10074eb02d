use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinKey {
    pub query_context: String,
    pub item_key: String,
}

impl PinKey {
    pub fn new(query_context: &str, item_key: &str) -> Self {
        Self {
            query_context: query_context.to_string(),
            item_key: item_key.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PinStore {
    pins: RwLock<HashSet<PinKey>>,
}

impl PinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, query_context: &str, item_key: &str) -> bool {
        self.pins.write().insert(PinKey::new(query_context, item_key))
    }

    pub fn unpin(&self, query_context: &str, item_key: &str) -> bool {
        self.pins.write().remove(&PinKey::new(query_context, item_key))
    }

    pub fn toggle(&self, query_context: &str, item_key: &str) -> bool {
        let key = PinKey::new(query_context, item_key);
        let mut pins = self.pins.write();
        if pins.remove(&key) {
            false
        } else {
            pins.insert(key);
            true
        }
    }

    pub fn is_pinned(&self, query_context: &str, item_key: &str) -> bool {
        self.pins
            .read()
            .contains(&PinKey::new(query_context, item_key))
    }

    pub fn len(&self) -> usize {
        self.pins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<PinKey> {
        let mut pins: Vec<PinKey> = self.pins.read().iter().cloned().collect();
        pins.sort();
        pins
    }

    pub fn load(&self, pins: impl IntoIterator<Item = PinKey>) {
        *self.pins.write() = pins.into_iter().collect();
    }
}
