//! Process-wide registry of named pools
//!
//! A pool is created by the first reference to its name and dropped from
//! the registry when the last reference goes away. The reference count lives
//! on the pool but only changes while the registry entry is locked.
//!
//! Never call into the registry while holding a pool lock.

use crate::metrics::PoolMetrics;
use crate::pool::ObjectPool;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct Instance {
    pools: DashMap<String, Arc<ObjectPool>>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference the pool called `name`, creating it if needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_workbroker::Instance;
    ///
    /// let instance = Instance::new();
    /// let pool = instance.ref_pool("jobs");
    /// assert_eq!(pool.references(), 1);
    ///
    /// instance.unref_pool("jobs");
    /// assert!(instance.get("jobs").is_none());
    /// ```
    pub fn ref_pool(&self, name: &str) -> Arc<ObjectPool> {
        let entry = self.pools.entry(name.to_string()).or_insert_with(|| {
            debug!(pool = name, "pool created");
            Arc::new(ObjectPool::new(name))
        });
        let references = entry.add_reference();
        debug!(pool = name, references, "pool referenced");
        Arc::clone(entry.value())
    }

    /// Drop one reference to `name`; the pool leaves the registry at zero.
    ///
    /// Returns the pool if it was registered.
    pub fn unref_pool(&self, name: &str) -> Option<Arc<ObjectPool>> {
        match self.pools.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let pool = Arc::clone(entry.get());
                let references = pool.drop_reference();
                if references == 0 {
                    entry.remove();
                    debug!(pool = name, "pool destroyed");
                } else {
                    debug!(pool = name, references, "pool unreferenced");
                }
                Some(pool)
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ObjectPool>> {
        self.pools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Get metrics for a registered pool
    pub fn metrics(&self, name: &str) -> Option<PoolMetrics> {
        self.get(name).map(|pool| pool.metrics())
    }
}
