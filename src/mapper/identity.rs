//! Identity table of the discovery pass: an arena of discovered vertices
//! addressed by [`Slot`], plus an index from instance identity to slot.

use ahash::AHashMap;

use crate::{graph::VertexId, instance::Guid};

/// Stable handle into an [`IdentityMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discovery {
    /// A new vertex was created for the instance.
    Created,
    /// The instance resolved to a vertex already in the store.
    Existing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredVertex {
    pub vertex: VertexId,
    pub guid: String,
    pub discovery: Discovery,
}

#[derive(Debug, Default)]
pub struct IdentityMap {
    arena: Vec<DiscoveredVertex>,
    index: AHashMap<Guid, Slot>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a discovered vertex under `guid`. The first registration of
    /// an identity wins; later ones return the existing slot.
    pub fn insert(&mut self, guid: Guid, entry: DiscoveredVertex) -> Slot {
        if let Some(slot) = self.index.get(&guid) {
            return *slot;
        }
        let slot = Slot(self.arena.len() as u32);
        self.arena.push(entry);
        self.index.insert(guid, slot);
        slot
    }

    pub fn slot(&self, guid: &Guid) -> Option<Slot> {
        self.index.get(guid).copied()
    }

    pub fn get(&self, slot: Slot) -> &DiscoveredVertex {
        &self.arena[slot.0 as usize]
    }

    pub fn lookup(&self, guid: &Guid) -> Option<&DiscoveredVertex> {
        self.slot(guid).map(|slot| self.get(slot))
    }

    pub fn vertex(&self, guid: &Guid) -> Option<VertexId> {
        self.lookup(guid).map(|entry| entry.vertex)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_resolves_to_one_slot() {
        let mut map = IdentityMap::new();
        let entry = DiscoveredVertex {
            vertex: VertexId(3),
            guid: "g-1".to_string(),
            discovery: Discovery::Created,
        };
        let first = map.insert(Guid::Transient(9), entry.clone());
        let again = map.insert(
            Guid::Transient(9),
            DiscoveredVertex {
                vertex: VertexId(4),
                ..entry
            },
        );
        assert_eq!(first, again);
        assert_eq!(map.len(), 1);
        assert_eq!(map.vertex(&Guid::Transient(9)), Some(VertexId(3)));
        assert!(map.lookup(&Guid::Assigned("g-1".to_string())).is_none());
    }
}
