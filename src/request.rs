//! Per-request bookkeeping: the request time and the GUIDs each request
//! created, updated and deleted.

use ahash::AHashSet;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// GUIDs touched by one request, in first-touch order and without
/// duplicates. An entity created in a request is never also listed as
/// updated; a deleted entity is never listed as updated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMutations {
    /// GUIDs of the request's root instances, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guids: Vec<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl EntityMutations {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug)]
pub struct RequestContext {
    request_time: i64,
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
    seen_created: AHashSet<String>,
    seen_updated: AHashSet<String>,
    seen_deleted: AHashSet<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::at(Utc::now().timestamp_millis())
    }

    pub fn at(request_time: i64) -> Self {
        Self {
            request_time,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            seen_created: AHashSet::new(),
            seen_updated: AHashSet::new(),
            seen_deleted: AHashSet::new(),
        }
    }

    /// Epoch milliseconds stamped on every element this request touches.
    pub fn request_time(&self) -> i64 {
        self.request_time
    }

    pub fn record_created(&mut self, guid: &str) {
        if self.seen_created.insert(guid.to_string()) {
            self.created.push(guid.to_string());
        }
    }

    pub fn record_updated(&mut self, guid: &str) {
        if self.seen_created.contains(guid) || self.seen_deleted.contains(guid) {
            return;
        }
        if self.seen_updated.insert(guid.to_string()) {
            self.updated.push(guid.to_string());
        }
    }

    pub fn record_deleted(&mut self, guid: &str) {
        if self.seen_deleted.insert(guid.to_string()) {
            self.deleted.push(guid.to_string());
        }
        if self.seen_updated.remove(guid) {
            self.updated.retain(|g| g != guid);
        }
    }

    pub fn is_deleted(&self, guid: &str) -> bool {
        self.seen_deleted.contains(guid)
    }

    pub fn into_mutations(self) -> EntityMutations {
        EntityMutations {
            guids: Vec::new(),
            created: self.created,
            updated: self.updated,
            deleted: self.deleted,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
