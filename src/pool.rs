//! Named work pool: queueing, group-affine batching and the watermark protocol
//!
//! All state of a pool sits behind one mutex. Locking returns a [`PoolGuard`];
//! dropping the guard re-derives the two readiness signals from the state it
//! leaves behind, so waiters always observe the condition as of the last
//! unlock:
//!
//! - queue-ready is armed while the global queue is non-empty,
//! - mark-ready is armed while nobody holds the marker role and
//!   `size <= mark`.

use crate::grouped::GroupedObjectList;
use crate::list::ObjectList;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::object::{Object, ObjectKey, ObjectStore};
use crate::session::SessionId;
use crate::set::ObjectSet;

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Shared handle to one named pool
pub struct ObjectPool {
    name: String,
    state: Mutex<PoolState>,
    queue_ready: watch::Sender<bool>,
    mark_ready: watch::Sender<bool>,
    references: AtomicUsize,
}

impl ObjectPool {
    /// Create an empty pool with a watermark of zero
    pub fn new(name: impl Into<String>) -> Self {
        let state = PoolState::new();
        let (queue_ready, _) = watch::channel(state.queue_signal());
        let (mark_ready, _) = watch::channel(state.mark_signal());
        Self {
            name: name.into(),
            state: Mutex::new(state),
            queue_ready,
            mark_ready,
            references: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enter the pool's locked section
    pub fn lock(&self) -> PoolGuard<'_> {
        PoolGuard {
            pool: self,
            state: self.state.lock(),
        }
    }

    /// Receiver armed while the global queue holds objects
    pub fn queue_ready(&self) -> watch::Receiver<bool> {
        self.queue_ready.subscribe()
    }

    /// Receiver armed while a marker election is possible
    pub fn mark_ready(&self) -> watch::Receiver<bool> {
        self.mark_ready.subscribe()
    }

    /// Sessions currently bound to this pool
    pub fn references(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    pub(crate) fn add_reference(&self) -> usize {
        self.references.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn drop_reference(&self) -> usize {
        let previous = self.references.fetch_sub(1, Ordering::AcqRel);
        previous.saturating_sub(1)
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.lock();
        let tracker = &state.tracker;
        PoolMetrics {
            size: state.size,
            queued_objects: state.queued.len(),
            claimed_objects: state.size.saturating_sub(state.queued.len()),
            groups: state.grouped.group_count(),
            mark: state.mark,
            marker_held: state.marker.is_some(),
            references: self.references(),
            total_queued: tracker.total_queued,
            total_duplicates: tracker.total_duplicates,
            total_claimed: tracker.total_claimed,
            total_requeued: tracker.total_requeued,
            total_released: tracker.total_released,
            empty_dequeues: tracker.empty_dequeues,
            marker_elections: tracker.marker_elections,
        }
    }
}

/// The locked section of an [`ObjectPool`]
///
/// Dereferences to [`PoolState`]. Dropping it publishes the readiness
/// signals and then releases the mutex.
pub struct PoolGuard<'a> {
    pool: &'a ObjectPool,
    state: MutexGuard<'a, PoolState>,
}

impl Deref for PoolGuard<'_> {
    type Target = PoolState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for PoolGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        rearm(&self.pool.queue_ready, self.state.queue_signal());
        rearm(&self.pool.mark_ready, self.state.mark_signal());
    }
}

fn rearm(signal: &watch::Sender<bool>, armed: bool) {
    signal.send_if_modified(|current| {
        if *current == armed {
            return false;
        }
        *current = armed;
        true
    });
}

/// Mutable pool state, reachable only through a [`PoolGuard`]
#[derive(Debug)]
pub struct PoolState {
    store: ObjectStore,
    objects: ObjectSet,
    queued: ObjectList,
    grouped: GroupedObjectList,
    size: usize,
    mark: usize,
    marker: Option<SessionId>,
    tracker: MetricsTracker,
}

impl PoolState {
    fn new() -> Self {
        Self {
            store: ObjectStore::new(),
            objects: ObjectSet::new(),
            queued: ObjectList::new(),
            grouped: GroupedObjectList::new(),
            size: 0,
            mark: 0,
            marker: None,
            tracker: MetricsTracker::new(),
        }
    }

    /// Queue a new object unless an object with this id is already live.
    ///
    /// Returns whether the object was newly queued.
    pub fn queue(&mut self, id: &str, group: &str) -> bool {
        if self.objects.contains(id) {
            self.tracker.total_duplicates += 1;
            return false;
        }
        let object = Object::new(id, group);
        let (id, group) = (object.shared_id(), object.shared_group());
        let key = self.store.insert(object);
        self.objects.add(id, key);
        self.queued.append(&mut self.store, key);
        self.grouped.get_list(&group).append(&mut self.store, key);
        self.size += 1;
        self.tracker.total_queued += 1;
        true
    }

    /// Take up to `limit` queued objects.
    ///
    /// The oldest queued object overall comes first and fixes the batch's
    /// group; the rest of the batch is filled from that group's queue only.
    /// Returned objects stay live; the caller tracks them as claimed.
    pub fn dequeue(&mut self, limit: usize) -> Vec<ObjectKey> {
        let mut claimed = Vec::with_capacity(limit.min(self.queued.len()));
        if limit == 0 {
            return claimed;
        }
        let Some(first) = self.queued.remove_first(&mut self.store) else {
            self.tracker.empty_dequeues += 1;
            return claimed;
        };
        claimed.push(first);

        if let Some(group) = self.store.get(first).map(Object::shared_group) {
            if let Some(list) = self.grouped.list_mut(&group) {
                list.remove(&mut self.store, first);
                while claimed.len() < limit {
                    let Some(key) = list.remove_first(&mut self.store) else {
                        break;
                    };
                    self.queued.remove(&mut self.store, key);
                    claimed.push(key);
                }
                if list.is_empty() {
                    self.grouped.remove_list(&group);
                }
            }
        }

        self.tracker.total_claimed += claimed.len();
        claimed
    }

    /// Put a live, unlisted object back at the tail of the queues.
    ///
    /// Size is unchanged. Returns false if the object is not live or still
    /// sits in any list, queued or held by a session.
    pub fn requeue(&mut self, key: ObjectKey) -> bool {
        let Some(object) = self.store.get(key) else {
            return false;
        };
        if object.membership_count() > 0 {
            return false;
        }
        let group = object.shared_group();
        if !self.queued.append(&mut self.store, key) {
            return false;
        }
        self.grouped.get_list(&group).append(&mut self.store, key);
        self.tracker.total_requeued += 1;
        true
    }

    /// Retire a live object for good.
    ///
    /// The object must not be held in any session list. If it is still
    /// queued it is taken out of the queues first.
    pub fn release(&mut self, key: ObjectKey) -> bool {
        let Some(object) = self.store.get(key) else {
            return false;
        };
        let (id, group) = (object.shared_id(), object.shared_group());

        if self.queued.remove(&mut self.store, key) {
            if let Some(list) = self.grouped.list_mut(&group) {
                list.remove(&mut self.store, key);
                if list.is_empty() {
                    self.grouped.remove_list(&group);
                }
            }
        }
        if self
            .store
            .get(key)
            .is_some_and(|object| object.membership_count() > 0)
        {
            return false;
        }

        self.objects.remove(&id);
        self.store.remove(key);
        self.size -= 1;
        self.tracker.total_released += 1;
        true
    }

    /// Elect `session` as marker if the role is free and `size <= mark`.
    ///
    /// Returns the pool size announced to the new marker.
    pub fn try_claim_marker(&mut self, session: SessionId) -> Option<usize> {
        if !self.mark_signal() {
            return None;
        }
        self.marker = Some(session);
        self.tracker.marker_elections += 1;
        Some(self.size)
    }

    /// Set a new watermark; only the marker may, and doing so ends its role.
    pub fn set_mark(&mut self, session: SessionId, size: usize) -> bool {
        if self.marker != Some(session) {
            return false;
        }
        self.mark = size;
        self.marker = None;
        true
    }

    /// Give up the marker role without touching the watermark.
    pub fn release_marker(&mut self, session: SessionId) -> bool {
        if self.marker != Some(session) {
            return false;
        }
        self.marker = None;
        true
    }

    pub fn get(&self, id: &str) -> Option<ObjectKey> {
        self.objects.get(id)
    }

    pub fn object(&self, key: ObjectKey) -> Option<&Object> {
        self.store.get(key)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains(id)
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    /// Live objects, queued or claimed
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn mark(&self) -> usize {
        self.mark
    }

    pub fn marker(&self) -> Option<SessionId> {
        self.marker
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn group_len(&self, group: &str) -> usize {
        self.grouped.list(group).map_or(0, ObjectList::len)
    }

    pub fn group_count(&self) -> usize {
        self.grouped.group_count()
    }

    pub fn grouped_len(&self) -> usize {
        self.grouped.total_len()
    }

    /// Ids of the queued objects, oldest first
    pub fn queued_ids(&self) -> Vec<String> {
        self.queued
            .iter(&self.store)
            .filter_map(|key| self.store.get(key))
            .map(|object| object.id().to_string())
            .collect()
    }

    pub(crate) fn queue_signal(&self) -> bool {
        !self.queued.is_empty()
    }

    pub(crate) fn mark_signal(&self) -> bool {
        self.marker.is_none() && self.size <= self.mark
    }
}
