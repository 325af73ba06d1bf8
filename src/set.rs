//! Id index over the live objects of a pool

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::ObjectKey;

#[derive(Debug, Default)]
pub struct ObjectSet {
    objects: HashMap<Arc<str>, ObjectKey>,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` under `id`, replacing any previous entry.
    pub fn add(&mut self, id: Arc<str>, key: ObjectKey) {
        self.objects.insert(id, key);
    }

    pub fn remove(&mut self, id: &str) -> Option<ObjectKey> {
        self.objects.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ObjectKey> {
        self.objects.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectStore};

    #[test]
    fn test_lookup_by_id() {
        let mut store = ObjectStore::new();
        let key = store.insert(Object::new("a", "g"));
        let mut set = ObjectSet::new();

        assert!(!set.contains("a"));
        set.add(Arc::from("a"), key);
        assert!(set.contains("a"));
        assert_eq!(set.get("a"), Some(key));
        assert_eq!(set.len(), 1);

        assert_eq!(set.remove("a"), Some(key));
        assert_eq!(set.get("a"), None);
        assert!(set.is_empty());
    }
}
