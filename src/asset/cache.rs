use std::collections::HashMap;

use super::Handle;

/// Append-only storage addressed by handle or by name.
pub struct AssetCache<T> {
    items: Vec<T>,
    names: Vec<String>,
    by_name: HashMap<String, Handle<T>>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Inserts `item` under `name`. A later insert with the same name takes
    /// over the name; the earlier item stays reachable by handle.
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Handle<T> {
        let name = name.into();
        let handle = Handle::new(self.items.len());
        self.items.push(item);
        if let Some(previous) = self.by_name.insert(name.clone(), handle) {
            log::debug!("Asset name '{}' rebound from {:?} to {:?}", name, previous, handle);
        }
        self.names.push(name);
        handle
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Handle<T>> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, handle: Handle<T>) -> Option<&str> {
        self.names.get(handle.index()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (Handle::new(index), item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(index, item)| (Handle::new(index), item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_handle_and_name() {
        let mut cache = AssetCache::new();
        let a = cache.insert("a", 1);
        let b = cache.insert("b", 2);

        assert_eq!(cache.get(a), Some(&1));
        assert_eq!(cache.get_by_name("b"), Some(b));
        assert_eq!(cache.name(a), Some("a"));
        assert_eq!(cache.get_by_name("missing"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reusing_a_name_rebinds_it() {
        let mut cache = AssetCache::new();
        let first = cache.insert("sun", 1);
        let second = cache.insert("sun", 2);

        assert_eq!(cache.get_by_name("sun"), Some(second));
        assert_eq!(cache.get(first), Some(&1));
    }
}
