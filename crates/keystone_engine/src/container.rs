//! Per-instance resource containers.
//!
//! A [`ResourceContainer`] holds the object of one binding site within one
//! unit of work and drives it through
//!
//! ```text
//! Uninitialized -> Sourcing -> Ready -> Recycling -> Disposed
//! ```
//!
//! Transitions are serialised by a lock: sourcing completes on whatever
//! thread the provider calls back on, while recycling runs on the thread
//! completing the unit of work. Whichever comes second observes the state the
//! first one left behind. `Disposed` is terminal: an object arriving after
//! it is handed straight back to the pool (or dropped).

use crate::binding::SiteMetadata;
use crate::escalation::{CleanupFailure, Escalation};
use crate::function::FunctionContext;
use crate::monitor::{AssetToken, MonitorKind, MonitoredAsset, TimeoutMonitor};
use crate::resource::{DependencyRegistry, ManagedResource, ObjectRef, ResourceContext};
use crate::unit::UnitHandle;
use parking_lot::{MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::{Arc, Weak};

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// Nobody asked for the object yet.
    Uninitialized,
    /// Waiting on the pool or the provider.
    Sourcing,
    /// The object is available.
    Ready,
    /// The owning unit of work completed and the recycle function runs.
    Recycling,
    /// Terminal.
    Disposed,
}

impl core::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ContainerState::Uninitialized => "uninitialized",
            ContainerState::Sourcing => "sourcing",
            ContainerState::Ready => "ready",
            ContainerState::Recycling => "recycling",
            ContainerState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

pub(crate) type ReadyCallback =
    Box<dyn FnOnce(Result<Arc<ResourceContainer>, Escalation>) + Send + 'static>;

struct ContainerInner {
    state: ContainerState,
    history: Vec<ContainerState>,
    failure: Option<Escalation>,
    sourcing: Option<AssetToken>,
    waiters: Vec<ReadyCallback>,
    dependencies: Vec<Arc<ResourceContainer>>,
}

/// The object of one binding site within one unit of work.
pub struct ResourceContainer {
    site: Arc<SiteMetadata>,
    this: Weak<ResourceContainer>,
    owner: Option<UnitHandle>,
    inner: Mutex<ContainerInner>,
    object: RwLock<Option<Box<dyn ManagedResource>>>,
}

impl core::fmt::Debug for ResourceContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceContainer")
            .field("bound_name", &self.bound_name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ResourceContainer {
    pub(crate) fn new(site: Arc<SiteMetadata>, owner: Option<UnitHandle>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            site,
            this: this.clone(),
            owner,
            inner: Mutex::new(ContainerInner {
                state: ContainerState::Uninitialized,
                history: vec![ContainerState::Uninitialized],
                failure: None,
                sourcing: None,
                waiters: Vec::new(),
                dependencies: Vec::new(),
            }),
            object: RwLock::new(None),
        })
    }

    /// Bound name of the site.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        self.site.bound_name()
    }

    /// Metadata of the site.
    #[must_use]
    pub fn site(&self) -> &Arc<SiteMetadata> {
        &self.site
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.inner.lock().state
    }

    /// Every state entered so far, starting with `Uninitialized`.
    #[must_use]
    pub fn history(&self) -> Vec<ContainerState> {
        self.inner.lock().history.clone()
    }

    /// Why sourcing or recycling failed, if it did.
    #[must_use]
    pub fn failure(&self) -> Option<Escalation> {
        self.inner.lock().failure.clone()
    }

    /// Borrows the ready object as `T`.
    ///
    /// `None` if the container is not ready or the object is not a `T`.
    #[must_use]
    pub fn object<T: ManagedResource>(&self) -> Option<ObjectRef<'_, T>> {
        if self.state() != ContainerState::Ready {
            return None;
        }
        RwLockReadGuard::try_map(self.object.read(), |object| {
            object.as_deref().and_then(|o| o.downcast_ref::<T>())
        })
        .ok()
    }

    /// Mutably borrows the ready object as `T`.
    #[must_use]
    pub fn object_mut<T: ManagedResource>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        if self.state() != ContainerState::Ready {
            return None;
        }
        RwLockWriteGuard::try_map(self.object.write(), |object| {
            object.as_deref_mut().and_then(|o| o.downcast_mut::<T>())
        })
        .ok()
    }

    fn transition(&self, inner: &mut ContainerInner, to: ContainerState) {
        tracing::trace!(bound_name = %self.bound_name(), from = %inner.state, %to, "container transition");
        inner.state = to;
        inner.history.push(to);
    }

    fn unavailable(&self, inner: &ContainerInner) -> Escalation {
        inner
            .failure
            .clone()
            .unwrap_or_else(|| Escalation::Unavailable {
                bound_name: self.bound_name().to_string(),
                reason: format!("resource is {}", inner.state),
            })
    }

    fn sourcing_monitor(&self) -> Option<&Arc<TimeoutMonitor>> {
        self.site.lifecycle().map(|l| l.sourcing_monitor())
    }

    pub(crate) fn escalate(&self, escalation: Escalation) {
        match &self.owner {
            Some(owner) => owner.escalate(escalation),
            None => tracing::error!(
                bound_name = %self.bound_name(),
                %escalation,
                "escalation without a unit of work"
            ),
        }
    }

    /// Requests the object. `on_ready` runs once it is ready or has failed,
    /// possibly on another thread.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        dependencies: Vec<Arc<ResourceContainer>>,
        on_ready: ReadyCallback,
    ) {
        let mut inner = self.inner.lock();
        match inner.state {
            ContainerState::Ready => {
                drop(inner);
                on_ready(Ok(Arc::clone(self)));
            }
            ContainerState::Sourcing => inner.waiters.push(on_ready),
            ContainerState::Recycling | ContainerState::Disposed => {
                let error = self.unavailable(&inner);
                drop(inner);
                on_ready(Err(error));
            }
            ContainerState::Uninitialized => {
                let Some(monitor) = self.sourcing_monitor() else {
                    drop(inner);
                    on_ready(Err(Escalation::Unavailable {
                        bound_name: self.bound_name().to_string(),
                        reason: "binding site is not finalized".to_string(),
                    }));
                    return;
                };
                self.transition(&mut inner, ContainerState::Sourcing);
                inner.waiters.push(on_ready);
                inner.dependencies = dependencies;
                let asset: Weak<dyn MonitoredAsset> = self.this.clone();
                inner.sourcing = Some(monitor.register(asset));
                drop(inner);

                let descriptor = self.site.provider();
                match descriptor.pool().and_then(|pool| pool.pool().acquire()) {
                    Some(object) => {
                        tracing::debug!(bound_name = %self.bound_name(), "sourced from pool");
                        self.sourced(object);
                    }
                    None => descriptor
                        .provider()
                        .source(SourceSink::new(Arc::clone(self))),
                }
            }
        }
    }

    /// Makes `object` the ready object without asking the provider.
    pub(crate) fn supply(self: &Arc<Self>, object: Box<dyn ManagedResource>) -> Result<(), Escalation> {
        let mut inner = self.inner.lock();
        if inner.state != ContainerState::Uninitialized {
            let error = Escalation::Unavailable {
                bound_name: self.bound_name().to_string(),
                reason: format!("cannot supply an object to a resource that is {}", inner.state),
            };
            return Err(error);
        }
        self.transition(&mut inner, ContainerState::Sourcing);
        drop(inner);
        self.sourced(object);
        match self.state() {
            ContainerState::Ready => Ok(()),
            _ => Err(self.unavailable(&self.inner.lock())),
        }
    }

    fn sourced(self: &Arc<Self>, mut object: Box<dyn ManagedResource>) {
        let object_type = self.site.provider().object_type();
        if (*object).as_any().type_id() != object_type.arg_type().type_id() {
            self.fail(Escalation::SourcingFailed {
                bound_name: self.bound_name().to_string(),
                message: format!("supplied object is not a {}", object_type.type_name()),
            });
            return;
        }

        let capabilities = object_type.capabilities();
        if capabilities.context_aware {
            object.bind_context(ResourceContext::new(
                self.site.shared_name(),
                self.site.span().clone(),
            ));
        }
        if capabilities.asynchronous {
            object.bind_async(AsyncContext::new(self));
        }
        if capabilities.coordinating {
            let dependencies = core::mem::take(&mut self.inner.lock().dependencies);
            if let Err(escalation) = object.load_dependencies(&DependencyRegistry::new(dependencies)) {
                self.discard(object, &escalation);
                self.fail(escalation);
                return;
            }
        }

        let mut inner = self.inner.lock();
        if inner.state != ContainerState::Sourcing {
            drop(inner);
            tracing::warn!(bound_name = %self.bound_name(), "object supplied after the resource was disposed");
            self.release(object);
            return;
        }
        if let (Some(token), Some(monitor)) = (inner.sourcing.take(), self.sourcing_monitor()) {
            monitor.deregister(token);
        }
        for governance in self.site.governance() {
            governance.govern(self.bound_name(), &*object);
        }
        *self.object.write() = Some(object);
        self.transition(&mut inner, ContainerState::Ready);
        let waiters = core::mem::take(&mut inner.waiters);
        drop(inner);

        for waiter in waiters {
            waiter(Ok(Arc::clone(self)));
        }
    }

    /// Fails sourcing. Ignored once the object is ready.
    pub(crate) fn fail(&self, escalation: Escalation) {
        let mut inner = self.inner.lock();
        if !matches!(
            inner.state,
            ContainerState::Uninitialized | ContainerState::Sourcing
        ) {
            tracing::debug!(bound_name = %self.bound_name(), state = %inner.state, %escalation, "ignoring late sourcing failure");
            return;
        }
        if let (Some(token), Some(monitor)) = (inner.sourcing.take(), self.sourcing_monitor()) {
            monitor.deregister(token);
        }
        inner.failure = Some(escalation.clone());
        self.transition(&mut inner, ContainerState::Disposed);
        let waiters = core::mem::take(&mut inner.waiters);
        drop(inner);

        for waiter in waiters {
            waiter(Err(escalation.clone()));
        }
        self.escalate(escalation);
    }

    fn release(&self, object: Box<dyn ManagedResource>) {
        if let Some(pool) = self.site.provider().pool() {
            pool.pool().release(object);
        }
    }

    fn discard(&self, object: Box<dyn ManagedResource>, cause: &Escalation) {
        if let Some(pool) = self.site.provider().pool() {
            pool.pool().lost(object, cause);
        }
    }

    /// Recycles the object: runs the recycle function, then returns the object
    /// to the pool. Idempotent.
    ///
    /// # Errors
    ///
    /// [`CleanupFailure`] if the recycle function failed. The container is
    /// disposed either way.
    pub(crate) fn recycle(&self) -> Result<(), CleanupFailure> {
        let mut inner = self.inner.lock();
        match inner.state {
            ContainerState::Ready => self.transition(&mut inner, ContainerState::Recycling),
            ContainerState::Sourcing => {
                if let (Some(token), Some(monitor)) = (inner.sourcing.take(), self.sourcing_monitor()) {
                    monitor.deregister(token);
                }
                let escalation = Escalation::Unavailable {
                    bound_name: self.bound_name().to_string(),
                    reason: "unit of work completed before sourcing finished".to_string(),
                };
                inner.failure = Some(escalation.clone());
                self.transition(&mut inner, ContainerState::Disposed);
                let waiters = core::mem::take(&mut inner.waiters);
                drop(inner);
                for waiter in waiters {
                    waiter(Err(escalation.clone()));
                }
                return Ok(());
            }
            ContainerState::Uninitialized => {
                self.transition(&mut inner, ContainerState::Disposed);
                return Ok(());
            }
            ContainerState::Recycling | ContainerState::Disposed => return Ok(()),
        }
        drop(inner);

        let object = self.object.write().take();
        for governance in self.site.governance() {
            governance.release(self.bound_name());
        }
        let recycle = self
            .site
            .lifecycle()
            .and_then(|lifecycle| lifecycle.bound().recycle().cloned());

        let (object, outcome) = match (object, recycle) {
            (Some(object), Some(function)) => {
                let parameter = RecycleParameter::new(self.site.shared_name(), object);
                let mut context = FunctionContext::new(function.name(), Some(Box::new(parameter)));
                let outcome = function.invoke(&mut context);
                let object = context
                    .take_argument::<RecycleParameter>()
                    .and_then(RecycleParameter::into_object);
                (object, outcome)
            }
            (object, _) => (object, Ok(())),
        };

        if let Some(object) = object {
            match &outcome {
                Ok(()) => self.release(object),
                Err(escalation) => self.discard(object, escalation),
            }
        }

        let mut inner = self.inner.lock();
        if let Err(escalation) = &outcome {
            inner.failure = Some(escalation.clone());
        }
        self.transition(&mut inner, ContainerState::Disposed);
        drop(inner);

        outcome.map_err(|error| {
            tracing::warn!(bound_name = %self.bound_name(), %error, "recycling failed");
            CleanupFailure {
                resource_type: self.site.provider().object_type().type_name(),
                bound_name: self.bound_name().to_string(),
                error,
            }
        })
    }
}

impl MonitoredAsset for ResourceContainer {
    fn timed_out(&self, kind: MonitorKind, escalation: Escalation) {
        match kind {
            MonitorKind::Sourcing => self.fail(escalation),
            MonitorKind::Operation => self.escalate(escalation),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SourceSink
// ─────────────────────────────────────────────────────────────────────────────

/// Completion handle handed to [`Provider::source`](crate::provider::Provider::source).
///
/// May be moved to another thread and completed later. Dropping it without
/// completing leaves the sourcing monitor to time the request out.
#[derive(Debug)]
pub struct SourceSink {
    container: Arc<ResourceContainer>,
}

impl SourceSink {
    fn new(container: Arc<ResourceContainer>) -> Self {
        Self { container }
    }

    /// Bound name of the site being sourced.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        self.container.bound_name()
    }

    /// Supplies the object.
    pub fn ready<T: ManagedResource>(self, object: T) {
        self.ready_boxed(Box::new(object));
    }

    /// Supplies an already boxed object.
    pub fn ready_boxed(self, object: Box<dyn ManagedResource>) {
        self.container.sourced(object);
    }

    /// Reports that no object can be supplied.
    pub fn fail(self, message: impl Into<String>) {
        let bound_name = self.bound_name().to_string();
        self.container.fail(Escalation::SourcingFailed {
            bound_name,
            message: message.into(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Asynchronous operations
// ─────────────────────────────────────────────────────────────────────────────

/// Handed to asynchronous resources so they can report in-flight operations.
#[derive(Clone)]
pub struct AsyncContext {
    container: Weak<ResourceContainer>,
    monitor: Option<Arc<TimeoutMonitor>>,
}

impl core::fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncContext")
            .field("monitor", &self.monitor.as_ref().map(|m| m.name()))
            .finish_non_exhaustive()
    }
}

impl AsyncContext {
    fn new(container: &Arc<ResourceContainer>) -> Self {
        let monitor = container
            .site
            .lifecycle()
            .and_then(|l| l.operation_monitor().cloned());
        Self {
            container: Arc::downgrade(container),
            monitor,
        }
    }

    /// Starts watching an operation. It must be completed or failed.
    #[must_use]
    pub fn start(&self) -> AsyncOperation {
        let token = match (&self.monitor, self.container.upgrade()) {
            (Some(monitor), Some(container)) => {
                let asset: Weak<dyn MonitoredAsset> = Arc::downgrade(&container) as Weak<ResourceContainer>;
                Some(monitor.register(asset))
            }
            _ => None,
        };
        AsyncOperation {
            context: self.clone(),
            token,
        }
    }
}

/// One in-flight asynchronous operation.
#[derive(Debug)]
pub struct AsyncOperation {
    context: AsyncContext,
    token: Option<AssetToken>,
}

impl AsyncOperation {
    fn finish(&self) -> bool {
        match (&self.context.monitor, self.token) {
            (Some(monitor), Some(token)) => monitor.deregister(token),
            _ => true,
        }
    }

    /// Records progress, restarting the operation timeout.
    pub fn touch(&self) {
        if let (Some(monitor), Some(token)) = (&self.context.monitor, self.token) {
            monitor.touch(token);
        }
    }

    /// The operation succeeded.
    pub fn complete(self) {
        self.finish();
    }

    /// The operation failed. The failure is escalated to the unit of work,
    /// unless the operation already timed out.
    pub fn fail(self, message: impl Into<String>) {
        if !self.finish() {
            return;
        }
        if let Some(container) = self.context.container.upgrade() {
            container.escalate(Escalation::AsyncOperationFailed {
                bound_name: container.bound_name().to_string(),
                message: message.into(),
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecycleParameter
// ─────────────────────────────────────────────────────────────────────────────

/// Argument passed to a provider's recycle function.
///
/// Whatever object is left in the parameter after the function returns goes
/// back to the pool.
pub struct RecycleParameter {
    bound_name: Arc<str>,
    object: Option<Box<dyn ManagedResource>>,
}

impl core::fmt::Debug for RecycleParameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecycleParameter")
            .field("bound_name", &self.bound_name)
            .field("has_object", &self.object.is_some())
            .finish()
    }
}

impl RecycleParameter {
    fn new(bound_name: Arc<str>, object: Box<dyn ManagedResource>) -> Self {
        Self {
            bound_name,
            object: Some(object),
        }
    }

    /// Bound name of the recycled site.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        &self.bound_name
    }

    /// Borrows the object as `T`.
    #[must_use]
    pub fn object<T: ManagedResource>(&self) -> Option<&T> {
        self.object.as_deref().and_then(|o| o.downcast_ref::<T>())
    }

    /// Mutably borrows the object as `T`.
    pub fn object_mut<T: ManagedResource>(&mut self) -> Option<&mut T> {
        self.object.as_deref_mut().and_then(|o| o.downcast_mut::<T>())
    }

    /// Takes the object, keeping it out of the pool.
    pub fn take_object(&mut self) -> Option<Box<dyn ManagedResource>> {
        self.object.take()
    }

    fn into_object(self) -> Option<Box<dyn ManagedResource>> {
        self.object
    }
}
