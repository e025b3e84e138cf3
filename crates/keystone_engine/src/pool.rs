//! Pooling of managed objects.
//!
//! A pool is the only mutable structure shared by all binding sites of a
//! provider. The engine treats it as a black box: it asks for an object with
//! [`ResourcePool::acquire`] before falling back to the provider, and hands
//! objects back with [`ResourcePool::release`] once they are disposed.
//! Implementations synchronise internally.

use crate::escalation::Escalation;
use crate::resource::{ManagedResource, ObjectType};
use std::sync::Arc;

/// Pool of managed objects for one provider.
pub trait ResourcePool: Send + Sync + 'static {
    /// Returns a pooled object, or `None` to have the provider source a new one.
    fn acquire(&self) -> Option<Box<dyn ManagedResource>>;

    /// Takes back an object whose binding site was disposed normally.
    fn release(&self, resource: Box<dyn ManagedResource>);

    /// Takes back an object whose recycling failed. Dropped by default.
    fn lost(&self, resource: Box<dyn ManagedResource>, cause: &Escalation) {
        tracing::debug!(%cause, "discarding pooled resource");
        drop(resource);
    }
}

/// Notified when a worker thread that used pooled objects finishes its unit of work.
pub trait ThreadCompletionListener: Send + Sync + 'static {
    /// Called on the completing thread.
    fn thread_completed(&self);
}

/// Creates a pool once the provider has been initialised.
pub type PoolFactory =
    Box<dyn FnOnce(&PoolContext) -> Result<Arc<dyn ResourcePool>, PoolError> + Send>;

/// Creates a thread-completion listener for a freshly created pool.
pub type ThreadCompletionFactory =
    Box<dyn FnOnce(&Arc<dyn ResourcePool>) -> Arc<dyn ThreadCompletionListener> + Send>;

/// Information available to a [`PoolFactory`].
#[derive(Debug, Clone)]
pub struct PoolContext {
    provider: String,
    object_type: ObjectType,
}

impl PoolContext {
    pub(crate) fn new(provider: &str, object_type: ObjectType) -> Self {
        Self {
            provider: provider.to_string(),
            object_type,
        }
    }

    /// Name of the pooled provider.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// Type of the pooled objects.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

/// Failure to create a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A created pool together with its thread-completion listeners.
#[derive(Clone)]
pub struct PoolDescriptor {
    pool: Arc<dyn ResourcePool>,
    thread_completion: Vec<Arc<dyn ThreadCompletionListener>>,
}

impl core::fmt::Debug for PoolDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolDescriptor")
            .field("thread_completion", &self.thread_completion.len())
            .finish_non_exhaustive()
    }
}

impl PoolDescriptor {
    pub(crate) fn new(
        pool: Arc<dyn ResourcePool>,
        thread_completion: Vec<Arc<dyn ThreadCompletionListener>>,
    ) -> Self {
        Self {
            pool,
            thread_completion,
        }
    }

    /// The pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<dyn ResourcePool> {
        &self.pool
    }

    /// Thread-completion listeners.
    #[must_use]
    pub fn thread_completion_listeners(&self) -> &[Arc<dyn ThreadCompletionListener>] {
        &self.thread_completion
    }

    pub(crate) fn notify_thread_completed(&self) {
        for listener in &self.thread_completion {
            listener.thread_completed();
        }
    }
}
