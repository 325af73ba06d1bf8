//! Work items and the store that owns them
//!
//! Every object lives in the slab-backed [`ObjectStore`] of its pool and is addressed by
//! an [`ObjectKey`]. List membership is recorded on the object itself: one
//! [`ObjectAnchor`] per list it belongs to, keyed by that list's
//! [`ListIndex`]. Lists only ever touch anchors through the store, which is
//! why every list operation takes the store as an argument.

use slab::Slab;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LIST_INDEX: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of an [`ObjectList`](crate::ObjectList).
///
/// Indices increase monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListIndex(u64);

impl ListIndex {
    pub(crate) fn next() -> Self {
        Self(NEXT_LIST_INDEX.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to an object slot in an [`ObjectStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    slot: usize,
    stamp: u64,
}

/// Links of one object inside one list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectAnchor {
    pub(crate) prev: Option<ObjectKey>,
    pub(crate) next: Option<ObjectKey>,
}

/// A unit of work: an id unique within its pool plus the group used for
/// batch affinity.
#[derive(Debug)]
pub struct Object {
    id: Arc<str>,
    group: Arc<str>,
    anchors: HashMap<ListIndex, ObjectAnchor>,
}

impl Object {
    pub fn new(id: impl Into<Arc<str>>, group: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            anchors: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub(crate) fn shared_group(&self) -> Arc<str> {
        Arc::clone(&self.group)
    }

    /// Whether this object is currently a member of the list with `index`.
    pub fn has_anchor(&self, index: ListIndex) -> bool {
        self.anchors.contains_key(&index)
    }

    /// Number of lists this object currently belongs to.
    pub fn membership_count(&self) -> usize {
        self.anchors.len()
    }
}

#[derive(Debug)]
struct Entry {
    stamp: u64,
    object: Object,
}

/// Slab of objects with stamped keys.
///
/// Slab slots are reused after removal; the per-insert stamp in each key
/// makes a handle to a removed object stale, so looking it up yields `None`
/// even once its slot holds a new object.
#[derive(Debug, Default)]
pub struct ObjectStore {
    entries: Slab<Entry>,
    next_stamp: u64,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Object) -> ObjectKey {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        let slot = self.entries.insert(Entry { stamp, object });
        ObjectKey { slot, stamp }
    }

    /// Frees the slot of `key` and returns its object.
    pub(crate) fn remove(&mut self, key: ObjectKey) -> Option<Object> {
        self.get(key)?;
        self.entries.try_remove(key.slot).map(|entry| entry.object)
    }

    pub fn get(&self, key: ObjectKey) -> Option<&Object> {
        self.entries
            .get(key.slot)
            .filter(|entry| entry.stamp == key.stamp)
            .map(|entry| &entry.object)
    }

    fn get_mut(&mut self, key: ObjectKey) -> Option<&mut Object> {
        self.entries
            .get_mut(key.slot)
            .filter(|entry| entry.stamp == key.stamp)
            .map(|entry| &mut entry.object)
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn anchor(&self, key: ObjectKey, index: ListIndex) -> Option<&ObjectAnchor> {
        self.get(key)?.anchors.get(&index)
    }

    pub(crate) fn anchor_mut(
        &mut self,
        key: ObjectKey,
        index: ListIndex,
    ) -> Option<&mut ObjectAnchor> {
        self.get_mut(key)?.anchors.get_mut(&index)
    }

    /// Attaches a fresh anchor; false if the object is gone or already anchored.
    pub(crate) fn attach_anchor(
        &mut self,
        key: ObjectKey,
        index: ListIndex,
        anchor: ObjectAnchor,
    ) -> bool {
        match self.get_mut(key) {
            Some(object) if !object.anchors.contains_key(&index) => {
                object.anchors.insert(index, anchor);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn detach_anchor(&mut self, key: ObjectKey, index: ListIndex) -> Option<ObjectAnchor> {
        self.get_mut(key)?.anchors.remove(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_indices_are_unique() {
        let a = ListIndex::next();
        let b = ListIndex::next();
        assert!(b > a);
    }

    #[test]
    fn test_stale_key_after_remove() {
        let mut store = ObjectStore::new();
        let first = store.insert(Object::new("a", "g"));
        assert_eq!(store.get(first).map(Object::id), Some("a"));

        let removed = store.remove(first).unwrap();
        assert_eq!(removed.id(), "a");
        assert!(store.is_empty());

        let second = store.insert(Object::new("b", "g"));
        assert_ne!(first, second);
        assert!(store.get(first).is_none());
        assert!(store.remove(first).is_none());
        assert_eq!(store.get(second).map(Object::group), Some("g"));
    }

    #[test]
    fn test_anchor_attach_is_exclusive() {
        let mut store = ObjectStore::new();
        let key = store.insert(Object::new("a", "g"));
        let index = ListIndex::next();

        assert!(store.attach_anchor(key, index, ObjectAnchor::default()));
        assert!(!store.attach_anchor(key, index, ObjectAnchor::default()));
        assert_eq!(store.get(key).unwrap().membership_count(), 1);

        assert!(store.detach_anchor(key, index).is_some());
        assert!(!store.get(key).unwrap().has_anchor(index));
    }
}
