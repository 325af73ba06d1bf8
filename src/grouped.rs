//! Per-group object lists, created on first use

use std::collections::HashMap;
use std::sync::Arc;

use crate::list::ObjectList;

#[derive(Debug, Default)]
pub struct GroupedObjectList {
    lists_by_group: HashMap<Arc<str>, ObjectList>,
}

impl GroupedObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The list for `group`, creating an empty one if none exists yet.
    pub fn get_list(&mut self, group: &Arc<str>) -> &mut ObjectList {
        self.lists_by_group
            .entry(Arc::clone(group))
            .or_default()
    }

    pub fn list(&self, group: &str) -> Option<&ObjectList> {
        self.lists_by_group.get(group)
    }

    pub fn list_mut(&mut self, group: &str) -> Option<&mut ObjectList> {
        self.lists_by_group.get_mut(group)
    }

    pub fn remove_list(&mut self, group: &str) -> Option<ObjectList> {
        self.lists_by_group.remove(group)
    }

    pub fn group_count(&self) -> usize {
        self.lists_by_group.len()
    }

    /// Sum of the lengths of every group list.
    pub fn total_len(&self) -> usize {
        self.lists_by_group.values().map(ObjectList::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectStore};

    #[test]
    fn test_lists_created_lazily_and_removed() {
        let mut store = ObjectStore::new();
        let mut grouped = GroupedObjectList::new();
        let g1: Arc<str> = Arc::from("g1");
        let key = store.insert(Object::new("a", "g1"));

        assert!(grouped.list("g1").is_none());
        grouped.get_list(&g1).append(&mut store, key);
        assert_eq!(grouped.group_count(), 1);
        assert_eq!(grouped.list("g1").map(ObjectList::len), Some(1));

        let index = grouped.list("g1").unwrap().index();
        assert_eq!(grouped.get_list(&g1).index(), index);

        grouped.list_mut("g1").unwrap().remove(&mut store, key);
        grouped.remove_list("g1");
        assert_eq!(grouped.group_count(), 0);
        assert_eq!(grouped.total_len(), 0);
    }
}
