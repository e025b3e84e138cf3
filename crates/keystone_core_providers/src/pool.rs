//! A bounded idle-object pool.
//!
//! ```
//! use keystone_core_providers::pool::BoundedPool;
//! use keystone_engine::prelude::*;
//!
//! let pool = BoundedPool::new(4);
//! let mut builder = OfficeFloorBuilder::new();
//! # #[derive(Clone)] struct Buffer; impl ManagedResource for Buffer {}
//! # let provider = keystone_core_providers::SingletonProvider::new(Buffer);
//! builder
//!     .add_provider("buffers", provider)
//!     .office("app")
//!     .pool(pool.factory())
//!     .thread_completion_listener(pool.trimmer(1));
//! ```

use keystone_engine::escalation::Escalation;
use keystone_engine::pool::{PoolContext, PoolError, ResourcePool, ThreadCompletionListener};
use keystone_engine::resource::ManagedResource;
use parking_lot::Mutex;
use std::sync::Arc;

/// Usage counters of a [`BoundedPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects handed out again.
    pub reused: u64,
    /// Objects taken back and kept idle.
    pub released: u64,
    /// Objects dropped because the pool was full or trimmed.
    pub evicted: u64,
    /// Objects dropped because recycling failed.
    pub lost: u64,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Box<dyn ManagedResource>>,
    stats: PoolStats,
}

/// Keeps at most `capacity` idle objects.
///
/// Clones share the same idle objects.
#[derive(Clone)]
pub struct BoundedPool {
    capacity: usize,
    state: Arc<Mutex<PoolState>>,
}

impl core::fmt::Debug for BoundedPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedPool")
            .field("capacity", &self.capacity)
            .field("idle", &state.idle.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl BoundedPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Arc::new(Mutex::new(PoolState::default())),
        }
    }

    /// Maximum number of idle objects.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle objects.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    /// Drops idle objects beyond `keep`. Returns how many were dropped.
    pub fn trim(&self, keep: usize) -> usize {
        let mut state = self.state.lock();
        let excess = state.idle.len().saturating_sub(keep);
        state.idle.truncate(keep);
        state.stats.evicted += excess as u64;
        excess
    }

    /// Pool factory handing this pool to a provider.
    ///
    /// A zero-capacity pool is a configuration error.
    pub fn factory(
        &self,
    ) -> impl FnOnce(&PoolContext) -> Result<Arc<dyn ResourcePool>, PoolError> + Send + 'static {
        let pool = self.clone();
        move |context| {
            if pool.capacity == 0 {
                return Err(PoolError::Configuration(format!(
                    "pool of provider '{}' has zero capacity",
                    context.provider_name()
                )));
            }
            tracing::debug!(
                provider = context.provider_name(),
                object = context.object_type().type_name(),
                capacity = pool.capacity,
                "pool created"
            );
            Ok(Arc::new(pool) as Arc<dyn ResourcePool>)
        }
    }

    /// Listener trimming the pool to `keep` idle objects whenever a thread
    /// unit that used it completes.
    pub fn trimmer(
        &self,
        keep: usize,
    ) -> impl FnOnce(&Arc<dyn ResourcePool>) -> Arc<dyn ThreadCompletionListener> + Send + 'static {
        let pool = self.clone();
        move |_| Arc::new(PoolTrimmer { pool, keep }) as Arc<dyn ThreadCompletionListener>
    }
}

impl ResourcePool for BoundedPool {
    fn acquire(&self) -> Option<Box<dyn ManagedResource>> {
        let mut state = self.state.lock();
        let object = state.idle.pop()?;
        state.stats.reused += 1;
        Some(object)
    }

    fn release(&self, resource: Box<dyn ManagedResource>) {
        let mut state = self.state.lock();
        if state.idle.len() < self.capacity {
            state.idle.push(resource);
            state.stats.released += 1;
        } else {
            state.stats.evicted += 1;
        }
    }

    fn lost(&self, resource: Box<dyn ManagedResource>, cause: &Escalation) {
        tracing::debug!(%cause, "dropping object whose recycling failed");
        drop(resource);
        self.state.lock().stats.lost += 1;
    }
}

/// Trims a [`BoundedPool`] when a thread unit completes.
#[derive(Debug)]
pub struct PoolTrimmer {
    pool: BoundedPool,
    keep: usize,
}

impl ThreadCompletionListener for PoolTrimmer {
    fn thread_completed(&self) {
        let trimmed = self.pool.trim(self.keep);
        if trimmed > 0 {
            tracing::trace!(trimmed, keep = self.keep, "pool trimmed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slot;
    impl ManagedResource for Slot {}

    #[test]
    fn release_beyond_capacity_evicts() {
        let pool = BoundedPool::new(1);
        pool.release(Box::new(Slot));
        pool.release(Box::new(Slot));
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().evicted, 1);

        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_none());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn trimmer_keeps_requested_idle_count() {
        let pool = BoundedPool::new(8);
        for _ in 0..5 {
            pool.release(Box::new(Slot));
        }
        let shared: Arc<dyn ResourcePool> = Arc::new(pool.clone());
        let listener = (pool.trimmer(2))(&shared);
        listener.thread_completed();
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.stats().evicted, 3);
    }
}
