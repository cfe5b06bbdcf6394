use ahash::AHashMap;
use parking_lot::RwLock;

use crate::graph::EdgeRecord;

/// Per-vertex edge lists, keyed by vertex id.
#[derive(Default)]
pub struct AdjacencyCache {
    inner: RwLock<AHashMap<i64, Vec<EdgeRecord>>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, key: i64) -> Option<Vec<EdgeRecord>> {
        self.inner.read().get(&key).cloned()
    }

    pub fn insert(&self, key: i64, value: Vec<EdgeRecord>) {
        self.inner.write().insert(key, value);
    }

    pub fn remove(&self, key: i64) {
        self.inner.write().remove(&key);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
