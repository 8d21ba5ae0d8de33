//! Name-sorted texture table.
//!
//! Entries are kept sorted by name so lookup is a binary search. Equal names
//! are structurally allowed (the driver layer decides the duplicate policy),
//! so removal scans the whole equal-name run and matches by identity.

use std::sync::Arc;

use super::texture::Texture;

/// Sorted collection of shared texture references.
#[derive(Debug, Default)]
pub struct ResourceTable {
    entries: Vec<Arc<Texture>>,
}

impl ResourceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a texture by name. With equal names present, any of them may be
    /// returned.
    pub fn find(&self, name: &str) -> Option<&Arc<Texture>> {
        self.entries
            .binary_search_by(|entry| entry.name().cmp(name))
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Insert a texture, keeping the table sorted.
    pub fn insert(&mut self, texture: Arc<Texture>) {
        let index = self
            .entries
            .partition_point(|entry| entry.name() <= texture.name());
        self.entries.insert(index, texture);
    }

    /// Remove the given texture by identity. Returns whether it was present.
    pub fn remove(&mut self, texture: &Arc<Texture>) -> bool {
        let start = self
            .entries
            .partition_point(|entry| entry.name() < texture.name());
        let end = self
            .entries
            .partition_point(|entry| entry.name() <= texture.name());
        for index in start..end {
            if Arc::ptr_eq(&self.entries[index], texture) {
                self.entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Drop every table reference, regardless of outside users. Textures
    /// still referenced elsewhere stay alive through their own `Arc`s.
    pub fn purge_all(&mut self) {
        let still_referenced = self
            .entries
            .iter()
            .filter(|entry| Arc::strong_count(entry) > 1)
            .count();
        if still_referenced > 0 {
            log::debug!(
                "purging texture table with {still_referenced} texture(s) still referenced"
            );
        }
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Texture>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ResourceFactory, SoftwareBackend};
    use crate::resources::texture::TextureSource;
    use crate::types::{ColorFormat, Extent2d};

    fn texture(factory: &Arc<dyn ResourceFactory>, name: &str) -> Arc<Texture> {
        Arc::new(
            Texture::new(
                factory,
                name,
                Extent2d::new(8, 8),
                ColorFormat::A8R8G8B8,
                false,
                TextureSource::Created,
            )
            .unwrap(),
        )
    }

    fn factory() -> Arc<dyn ResourceFactory> {
        Arc::new(SoftwareBackend::new())
    }

    #[test]
    fn test_insert_keeps_names_sorted() {
        let factory = factory();
        let mut table = ResourceTable::new();
        for name in ["wall", "floor", "sky", "door"] {
            table.insert(texture(&factory, name));
        }
        let names: Vec<_> = table.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["door", "floor", "sky", "wall"]);
    }

    #[test]
    fn test_find_hits_and_misses() {
        let factory = factory();
        let mut table = ResourceTable::new();
        table.insert(texture(&factory, "grass"));
        assert!(table.find("grass").is_some());
        assert!(table.find("lava").is_none());
    }

    #[test]
    fn test_remove_matches_by_identity() {
        let factory = factory();
        let mut table = ResourceTable::new();
        let first = texture(&factory, "tile");
        let second = texture(&factory, "tile");
        table.insert(first.clone());
        table.insert(second.clone());

        assert!(table.remove(&second));
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(table.find("tile").unwrap(), &first));
        assert!(!table.remove(&second));
    }

    #[test]
    fn test_purge_all_clears_even_referenced_entries() {
        let factory = factory();
        let mut table = ResourceTable::new();
        let held = texture(&factory, "held");
        table.insert(held.clone());
        table.insert(texture(&factory, "loose"));

        table.purge_all();
        assert!(table.is_empty());
        // The outside reference keeps the texture alive past the purge.
        assert_eq!(held.name(), "held");
    }
}
