//! Keep / add / remove computation for collection attributes.
//!
//! Entries are compared by identity (an edge id for reference elements, the
//! stored value otherwise), so entries present on both sides keep their
//! persisted identity no matter where they moved.

use std::collections::BTreeMap;
use std::hash::Hash;

use ahash::AHashSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayDiff<T> {
    /// Entries present in both, in new order.
    pub kept: Vec<T>,
    /// Entries only in the new state, in new order.
    pub added: Vec<T>,
    /// Entries only in the current state, in current order.
    pub removed: Vec<T>,
}

pub fn diff_array<T>(current: &[T], new: &[T]) -> ArrayDiff<T>
where
    T: Clone + Eq + Hash,
{
    let current_set: AHashSet<&T> = current.iter().collect();
    let new_set: AHashSet<&T> = new.iter().collect();
    let (kept, added): (Vec<T>, Vec<T>) = new
        .iter()
        .cloned()
        .partition(|entry| current_set.contains(entry));
    let removed = current
        .iter()
        .filter(|entry| !new_set.contains(entry))
        .cloned()
        .collect();
    ArrayDiff {
        kept,
        added,
        removed,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapDiff<V> {
    pub kept: Vec<String>,
    pub added: Vec<String>,
    /// Keys present in both whose entry changed.
    pub changed: Vec<String>,
    /// Superseded entries: every key absent from the new map, and the old
    /// entry of every changed key.
    pub removed: Vec<(String, V)>,
}

pub fn diff_map<V>(current: &BTreeMap<String, V>, new: &BTreeMap<String, V>) -> MapDiff<V>
where
    V: Clone + PartialEq,
{
    let mut diff = MapDiff {
        kept: Vec::new(),
        added: Vec::new(),
        changed: Vec::new(),
        removed: Vec::new(),
    };
    for (key, entry) in new {
        match current.get(key) {
            None => diff.added.push(key.clone()),
            Some(old) if old == entry => diff.kept.push(key.clone()),
            Some(old) => {
                diff.changed.push(key.clone());
                diff.removed.push((key.clone(), old.clone()));
            }
        }
    }
    for (key, old) in current {
        if !new.contains_key(key) {
            diff.removed.push((key.clone(), old.clone()));
        }
    }
    diff
}

/// Persisted order: the new entries followed by retained ones not already
/// present.
pub fn merge_retained<T>(new: &[T], retained: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen: AHashSet<&T> = new.iter().collect();
    let mut merged = new.to_vec();
    for entry in retained {
        if seen.insert(entry) {
            merged.push(entry.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn array_diff_keeps_shared_entries() {
        let diff = diff_array(&strings(&["a", "b", "c"]), &strings(&["a", "c", "d"]));
        assert_eq!(diff.kept, strings(&["a", "c"]));
        assert_eq!(diff.added, strings(&["d"]));
        assert_eq!(diff.removed, strings(&["b"]));
    }

    #[test]
    fn array_diff_of_reordered_entries_removes_nothing() {
        let diff = diff_array(&strings(&["a", "b"]), &strings(&["b", "a"]));
        assert_eq!(diff.kept, strings(&["b", "a"]));
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn map_diff_reports_superseded_entries() {
        let current: BTreeMap<String, String> = [("x", "1"), ("y", "2"), ("z", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let new: BTreeMap<String, String> = [("x", "1"), ("y", "9"), ("w", "4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let diff = diff_map(&current, &new);
        assert_eq!(diff.kept, strings(&["x"]));
        assert_eq!(diff.added, strings(&["w"]));
        assert_eq!(diff.changed, strings(&["y"]));
        assert_eq!(
            diff.removed,
            vec![
                ("y".to_string(), "2".to_string()),
                ("z".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn merge_retained_appends_without_duplicates() {
        let merged = merge_retained(&strings(&["a", "c"]), &strings(&["b", "a"]));
        assert_eq!(merged, strings(&["a", "c", "b"]));
    }
}
