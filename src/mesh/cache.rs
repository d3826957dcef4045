use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::mesh::{Mesh, MeshBackend};

/// Cache key: geometry fingerprint and the backend that meshed it.
pub type MeshKey = (u64, MeshBackend);

/// Bounded least-recently-used cache of generated meshes.
///
/// Entries are kept most-recent first. A cache with zero slots stores
/// nothing.
#[derive(Debug, Default)]
pub struct MeshCache {
    slots: usize,
    entries: VecDeque<(MeshKey, Arc<Mesh>)>,
    hits: u64,
    misses: u64,
}

impl MeshCache {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            entries: VecDeque::with_capacity(slots),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached mesh and marks it most recently used.
    pub fn get(&mut self, key: MeshKey) -> Option<Arc<Mesh>> {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                self.hits += 1;
                let entry = self.entries.remove(pos)?;
                let mesh = entry.1.clone();
                self.entries.push_front(entry);
                Some(mesh)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a mesh, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: MeshKey, mesh: Arc<Mesh>) {
        if self.slots == 0 {
            return;
        }
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push_front((key, mesh));
        while self.entries.len() > self.slots {
            if let Some((evicted, _)) = self.entries.pop_back() {
                debug!(fingerprint = evicted.0, backend = ?evicted.1, "Evicted mesh from cache");
            }
        }
    }

    pub fn contains(&self, key: MeshKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Element;

    fn mesh() -> Arc<Mesh> {
        Arc::new(Mesh::new(
            MeshBackend::Triangle,
            vec![Element::new("air", 1.0, 1)],
        ))
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = MeshCache::new(2);
        let a = (1, MeshBackend::Triangle);
        let b = (2, MeshBackend::Triangle);
        let c = (3, MeshBackend::Triangle);
        cache.insert(a, mesh());
        cache.insert(b, mesh());
        // Touch `a` so `b` becomes least recently used
        assert!(cache.get(a).is_some());
        cache.insert(c, mesh());
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(a));
        assert!(!cache.contains(b));
        assert!(cache.contains(c));
    }

    #[test]
    fn test_backend_is_part_of_key() {
        let mut cache = MeshCache::new(4);
        let m = mesh();
        cache.insert((7, MeshBackend::Triangle), m.clone());
        assert!(cache.get((7, MeshBackend::Gmsh)).is_none());
        let hit = cache.get((7, MeshBackend::Triangle)).unwrap();
        assert!(Arc::ptr_eq(&hit, &m));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_zero_slots_disables_cache() {
        let mut cache = MeshCache::new(0);
        cache.insert((1, MeshBackend::Gmsh), mesh());
        assert!(cache.is_empty());
    }
}
