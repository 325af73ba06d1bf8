//! Intrusive FIFO list of objects
//!
//! An object can sit in any number of lists at once. Each list keeps only its
//! head, tail and length; the prev/next links live in the member's anchor for
//! this list's [`ListIndex`], so append and removal at any position are O(1)
//! and never affect the object's other memberships.

use crate::object::{ListIndex, ObjectAnchor, ObjectKey, ObjectStore};

#[derive(Debug)]
pub struct ObjectList {
    index: ListIndex,
    first: Option<ObjectKey>,
    last: Option<ObjectKey>,
    len: usize,
}

impl Default for ObjectList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectList {
    pub fn new() -> Self {
        Self {
            index: ListIndex::next(),
            first: None,
            last: None,
            len: 0,
        }
    }

    pub fn index(&self) -> ListIndex {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<ObjectKey> {
        self.first
    }

    pub fn last(&self) -> Option<ObjectKey> {
        self.last
    }

    /// Appends `key` at the tail.
    ///
    /// Returns false without touching the list if the object is already a
    /// member or no longer lives in `store`.
    pub fn append(&mut self, store: &mut ObjectStore, key: ObjectKey) -> bool {
        let anchor = ObjectAnchor {
            prev: self.last,
            next: None,
        };
        if !store.attach_anchor(key, self.index, anchor) {
            return false;
        }
        match self.last {
            Some(last) => {
                if let Some(last_anchor) = store.anchor_mut(last, self.index) {
                    last_anchor.next = Some(key);
                }
            }
            None => self.first = Some(key),
        }
        self.last = Some(key);
        self.len += 1;
        true
    }

    /// Unlinks `key` from wherever it sits. Returns false if it is not a member.
    pub fn remove(&mut self, store: &mut ObjectStore, key: ObjectKey) -> bool {
        let Some(anchor) = store.detach_anchor(key, self.index) else {
            return false;
        };
        match anchor.prev {
            Some(prev) => {
                if let Some(prev_anchor) = store.anchor_mut(prev, self.index) {
                    prev_anchor.next = anchor.next;
                }
            }
            None => self.first = anchor.next,
        }
        match anchor.next {
            Some(next) => {
                if let Some(next_anchor) = store.anchor_mut(next, self.index) {
                    next_anchor.prev = anchor.prev;
                }
            }
            None => self.last = anchor.prev,
        }
        self.len -= 1;
        true
    }

    /// Pops the head; `None` if the list is empty or its head is no longer
    /// linked in `store`.
    pub fn remove_first(&mut self, store: &mut ObjectStore) -> Option<ObjectKey> {
        let key = self.first?;
        self.remove(store, key).then_some(key)
    }

    /// Successor of `prev`; `None` as `prev` yields the head.
    pub fn next(&self, store: &ObjectStore, prev: Option<ObjectKey>) -> Option<ObjectKey> {
        match prev {
            None => self.first,
            Some(key) => store.anchor(key, self.index)?.next,
        }
    }

    pub fn contains(&self, store: &ObjectStore, key: ObjectKey) -> bool {
        store
            .get(key)
            .is_some_and(|object| object.has_anchor(self.index))
    }

    pub fn iter<'a>(&'a self, store: &'a ObjectStore) -> Iter<'a> {
        Iter {
            list: self,
            store,
            cursor: self.first,
        }
    }

    /// Snapshot of the members in list order; the list is left untouched.
    pub fn copy_to_vec(&self, store: &ObjectStore) -> Vec<ObjectKey> {
        let mut keys = Vec::with_capacity(self.len);
        keys.extend(self.iter(store));
        keys
    }

    /// Drains every member in list order and clears the list.
    ///
    /// Each drained object loses its anchor for this list, so it is fully
    /// detached afterwards.
    pub fn move_to_vec(&mut self, store: &mut ObjectStore) -> Vec<ObjectKey> {
        let keys = self.copy_to_vec(store);
        for key in &keys {
            store.detach_anchor(*key, self.index);
        }
        self.first = None;
        self.last = None;
        self.len = 0;
        keys
    }
}

/// Borrowing iterator over an [`ObjectList`].
pub struct Iter<'a> {
    list: &'a ObjectList,
    store: &'a ObjectStore,
    cursor: Option<ObjectKey>,
}

impl Iterator for Iter<'_> {
    type Item = ObjectKey;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        self.cursor = self.list.next(self.store, Some(key));
        Some(key)
    }
}
