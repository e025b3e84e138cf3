//! Units of work.
//!
//! A unit of work owns the containers of the binding sites of its scope and
//! recycles them when it completes. Units nest: a process unit creates
//! thread units, which create function units. A bound name is resolved by
//! walking outwards from the current unit to the one whose scope matches the
//! site, ending at the office for global sites.
//!
//! Escalations raised by a unit's containers (sourcing failures, timeouts,
//! failed asynchronous operations) are recorded on the unit. Completion
//! recycles every container, even past failures, and reports all escalations
//! plus at most one composite [`CleanupEscalation`].

use crate::binding::{Scope, SiteMetadata};
use crate::container::ResourceContainer;
use crate::escalation::{CleanupEscalation, Escalation};
use crate::floor::Office;
use crate::function::{FunctionContext, FunctionDecl};
use crate::types::Argument;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use hashbrown::HashSet;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Called with the report of a completed unit.
pub type CompletionHandler = Box<dyn FnOnce(&UnitReport) + Send + 'static>;

/// Outcome of a completed unit of work.
#[derive(Debug, Clone)]
pub struct UnitReport {
    scope: Scope,
    escalations: Vec<Escalation>,
    cleanup: Option<CleanupEscalation>,
}

impl UnitReport {
    pub(crate) fn refused(escalation: Escalation) -> Self {
        Self {
            scope: Scope::Process,
            escalations: vec![escalation],
            cleanup: None,
        }
    }

    /// Scope of the completed unit.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Escalations raised while the unit ran, in order.
    #[must_use]
    pub fn escalations(&self) -> &[Escalation] {
        &self.escalations
    }

    /// Composite failure of recycling, if any container failed to recycle.
    #[must_use]
    pub fn cleanup(&self) -> Option<&CleanupEscalation> {
        self.cleanup.as_ref()
    }

    /// Returns `true` if nothing was escalated and cleanup succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.escalations.is_empty() && self.cleanup.is_none()
    }

    /// The first escalation, else the cleanup failure.
    ///
    /// # Errors
    ///
    /// Returns the first recorded failure.
    pub fn into_result(self) -> Result<(), Escalation> {
        if let Some(escalation) = self.escalations.into_iter().next() {
            return Err(escalation);
        }
        match self.cleanup {
            Some(cleanup) => Err(Escalation::Cleanup(cleanup)),
            None => Ok(()),
        }
    }
}

struct UnitShared {
    scope: Scope,
    function: Option<String>,
    office: Arc<Office>,
    parent: Option<UnitOfWork>,
    containers: Mutex<IndexMap<String, Arc<ResourceContainer>>>,
    escalations: Mutex<Vec<Escalation>>,
    completion: Mutex<Option<CompletionHandler>>,
    completed: AtomicBool,
}

impl UnitShared {
    fn escalate(&self, escalation: Escalation) {
        tracing::warn!(scope = %self.scope, %escalation, "escalated to unit of work");
        self.escalations.lock().push(escalation);
    }
}

/// Weak reference containers keep to the unit they escalate to.
#[derive(Clone)]
pub(crate) struct UnitHandle(Weak<UnitShared>);

impl UnitHandle {
    pub(crate) fn escalate(&self, escalation: Escalation) {
        match self.0.upgrade() {
            Some(unit) => unit.escalate(escalation),
            None => tracing::error!(%escalation, "escalation after the unit of work was dropped"),
        }
    }
}

/// A process, thread or function scope driving binding sites.
///
/// Cheap to clone; clones share the same unit.
#[derive(Clone)]
pub struct UnitOfWork {
    shared: Arc<UnitShared>,
}

impl core::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("scope", &self.shared.scope)
            .field("function", &self.shared.function)
            .field("office", &self.shared.office.name())
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

impl UnitOfWork {
    fn with_parent(
        scope: Scope,
        function: Option<String>,
        office: Arc<Office>,
        parent: Option<UnitOfWork>,
    ) -> Self {
        Self {
            shared: Arc::new(UnitShared {
                scope,
                function,
                office,
                parent,
                containers: Mutex::new(IndexMap::new()),
                escalations: Mutex::new(Vec::new()),
                completion: Mutex::new(None),
                completed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn process(office: Arc<Office>) -> Self {
        Self::with_parent(Scope::Process, None, office, None)
    }

    /// Starts a thread unit inside this unit.
    #[must_use]
    pub fn begin_thread(&self) -> UnitOfWork {
        Self::with_parent(
            Scope::Thread,
            None,
            Arc::clone(&self.shared.office),
            Some(self.clone()),
        )
    }

    /// Starts a unit for one invocation of `function` inside this unit.
    #[must_use]
    pub fn begin_function(&self, function: &str) -> UnitOfWork {
        Self::with_parent(
            Scope::Function,
            Some(function.to_string()),
            Arc::clone(&self.shared.office),
            Some(self.clone()),
        )
    }

    /// Scope of this unit.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.shared.scope
    }

    /// Function of a function unit.
    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        self.shared.function.as_deref()
    }

    /// The office the unit runs in.
    #[must_use]
    pub fn office(&self) -> &Arc<Office> {
        &self.shared.office
    }

    /// Enclosing unit.
    #[must_use]
    pub fn parent(&self) -> Option<&UnitOfWork> {
        self.shared.parent.as_ref()
    }

    /// Returns `true` once [`complete`](Self::complete) ran.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    pub(crate) fn handle(&self) -> UnitHandle {
        UnitHandle(Arc::downgrade(&self.shared))
    }

    /// Sets the handler receiving the report on completion.
    pub fn on_complete(&self, handler: impl FnOnce(&UnitReport) + Send + 'static) {
        *self.shared.completion.lock() = Some(Box::new(handler));
    }

    /// Records an escalation.
    pub fn escalate(&self, escalation: Escalation) {
        self.shared.escalate(escalation);
    }

    /// Escalations recorded so far.
    #[must_use]
    pub fn escalations(&self) -> Vec<Escalation> {
        self.shared.escalations.lock().clone()
    }

    fn owns(&self, site: &SiteMetadata) -> bool {
        self.shared.scope == site.scope()
            && (site.scope() != Scope::Function || self.function_name() == site.enclosing())
    }

    /// Resolves the container of `bound_name` reachable from this unit,
    /// creating it (uninitialized) on first use.
    ///
    /// # Errors
    ///
    /// [`Escalation::UnknownBinding`] if no unit on the way out has the
    /// site's scope, [`Escalation::Unavailable`] if that unit already
    /// completed or the office is closed.
    pub fn container(&self, bound_name: &str) -> Result<Arc<ResourceContainer>, Escalation> {
        let office = &self.shared.office;
        let site = office
            .site(bound_name)
            .ok_or_else(|| Escalation::UnknownBinding(bound_name.to_string()))?;
        if office.is_closed() {
            return Err(office.closed_escalation(bound_name));
        }
        if site.scope() == Scope::Global {
            return office.global_container(site);
        }

        let mut unit = Some(self);
        while let Some(current) = unit {
            if current.owns(site) {
                return current.container_for(site);
            }
            unit = current.parent();
        }
        Err(Escalation::UnknownBinding(bound_name.to_string()))
    }

    fn container_for(&self, site: &Arc<SiteMetadata>) -> Result<Arc<ResourceContainer>, Escalation> {
        let mut containers = self.shared.containers.lock();
        if self.is_completed() {
            return Err(Escalation::Unavailable {
                bound_name: site.bound_name().to_string(),
                reason: format!("{} unit of work already completed", self.scope()),
            });
        }
        let container = containers
            .entry(site.bound_name().to_string())
            .or_insert_with(|| ResourceContainer::new(Arc::clone(site), Some(self.handle())));
        Ok(Arc::clone(container))
    }

    /// Makes this unit recycle `container` on completion.
    ///
    /// Returns `false` if the unit already completed or already holds a
    /// container for the same site.
    pub fn register_for_recycling(&self, container: Arc<ResourceContainer>) -> bool {
        let mut containers = self.shared.containers.lock();
        if self.is_completed() || containers.contains_key(container.bound_name()) {
            return false;
        }
        containers.insert(container.bound_name().to_string(), container);
        true
    }

    /// Acquires `bound_name`, sourcing its dependencies first.
    ///
    /// The container of `bound_name` is only created once its dependencies
    /// are acquired, so a unit never recycles a dependency before the
    /// objects depending on it.
    ///
    /// `on_ready` runs once the object is ready or sourcing failed, on
    /// whatever thread completes sourcing.
    pub fn acquire(
        &self,
        bound_name: &str,
        on_ready: impl FnOnce(Result<Arc<ResourceContainer>, Escalation>) + Send + 'static,
    ) {
        let Some(site) = self.shared.office.site(bound_name) else {
            let escalation = Escalation::UnknownBinding(bound_name.to_string());
            self.escalate(escalation.clone());
            on_ready(Err(escalation));
            return;
        };
        let dependencies = site.dependencies().to_vec();
        let unit = self.clone();
        let bound_name = bound_name.to_string();
        self.acquire_all(
            dependencies,
            Vec::new(),
            Box::new(move |acquired| match acquired {
                Ok(acquired) => match unit.container(&bound_name) {
                    Ok(container) => container.acquire(acquired, Box::new(on_ready)),
                    Err(escalation) => {
                        unit.escalate(escalation.clone());
                        on_ready(Err(escalation));
                    }
                },
                Err(escalation) => on_ready(Err(escalation)),
            }),
        );
    }

    fn acquire_all(
        &self,
        mut remaining: Vec<String>,
        mut acquired: Vec<Arc<ResourceContainer>>,
        done: Box<dyn FnOnce(Result<Vec<Arc<ResourceContainer>>, Escalation>) + Send>,
    ) {
        if remaining.is_empty() {
            done(Ok(acquired));
            return;
        }
        let next = remaining.remove(0);
        let unit = self.clone();
        self.acquire(&next, move |result| match result {
            Ok(container) => {
                acquired.push(container);
                unit.acquire_all(remaining, acquired, done);
            }
            Err(escalation) => done(Err(escalation)),
        });
    }

    /// Acquires `bound_name` and waits for it.
    ///
    /// # Errors
    ///
    /// The sourcing escalation, or [`Escalation::Timeout`] if `timeout`
    /// elapsed first.
    pub fn acquire_blocking(
        &self,
        bound_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Arc<ResourceContainer>, Escalation> {
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);
        self.acquire(bound_name, move |result| {
            let _ = sender.send(result);
        });
        let received = match timeout {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|_| Escalation::Timeout {
                bound_name: bound_name.to_string(),
                timeout,
            }),
            None => receiver.recv().map_err(|_| Escalation::Unavailable {
                bound_name: bound_name.to_string(),
                reason: "sourcing was abandoned".to_string(),
            }),
        };
        received?
    }

    /// Runs `function` of the office in this unit, after the functions it
    /// declared a dependency on.
    ///
    /// # Errors
    ///
    /// The first failing function's escalation.
    pub fn run(&self, function: &str, argument: Option<Argument>) -> Result<(), Escalation> {
        let decl = self
            .shared
            .office
            .functions()
            .get(function)
            .cloned()
            .ok_or_else(|| Escalation::failed(function, "no such function in office"))?;
        self.run_decl(&decl, argument)
    }

    pub(crate) fn run_decl(&self, decl: &FunctionDecl, argument: Option<Argument>) -> Result<(), Escalation> {
        let office = Arc::clone(&self.shared.office);
        for prerequisite in office.prerequisites(decl.name()) {
            if let Some(prerequisite) = office.functions().get(prerequisite) {
                self.invoke(prerequisite, None)?;
            }
        }
        self.invoke(decl, argument)
    }

    /// Invokes `decl` in a fresh function unit and completes that unit,
    /// forwarding its escalations here.
    fn invoke(&self, decl: &FunctionDecl, argument: Option<Argument>) -> Result<(), Escalation> {
        let call = self.begin_function(decl.name());
        let mut context = FunctionContext::new(decl.name(), argument).with_unit(call.clone());
        let outcome = decl.invoke(&mut context);
        drop(context);

        let report = call.complete();
        for escalation in report.escalations {
            self.escalate(escalation);
        }
        if let Some(cleanup) = report.cleanup {
            self.escalate(Escalation::Cleanup(cleanup));
        }
        outcome
    }

    /// Completes the unit: recycles every container in reverse creation
    /// order (dependants before their dependencies), notifies pool thread-completion listeners for thread units and
    /// hands the report to the completion handler. Only the first call does
    /// anything.
    pub fn complete(&self) -> UnitReport {
        let containers = {
            let mut containers = self.shared.containers.lock();
            if self.shared.completed.swap(true, Ordering::AcqRel) {
                return UnitReport {
                    scope: self.scope(),
                    escalations: Vec::new(),
                    cleanup: None,
                };
            }
            core::mem::take(&mut *containers)
        };

        let failures: Vec<_> = containers
            .values()
            .rev()
            .filter_map(|container| container.recycle().err())
            .collect();

        if self.scope() == Scope::Thread {
            let mut notified = HashSet::new();
            for container in containers.values() {
                let descriptor = container.site().provider();
                if let Some(pool) = descriptor.pool()
                    && notified.insert(descriptor.name().to_string())
                {
                    pool.notify_thread_completed();
                }
            }
        }

        let cleanup = (!failures.is_empty()).then(|| CleanupEscalation::new(failures));
        if let Some(cleanup) = &cleanup {
            tracing::warn!(scope = %self.scope(), %cleanup, "unit of work cleanup failed");
        }
        let report = UnitReport {
            scope: self.scope(),
            escalations: core::mem::take(&mut *self.shared.escalations.lock()),
            cleanup,
        };
        if let Some(handler) = self.shared.completion.lock().take() {
            handler(&report);
        }
        report
    }
}
