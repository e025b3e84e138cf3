//! Binding sites and their lifecycle metadata.
//!
//! A binding site is one placement of a provider's objects in a scope of an
//! office. Sites are created while the floor is assembled, possibly before
//! the provider they reference has been bound to its managing office. A site
//! is only usable once it has been *finalized*: its [`SiteLifecycle`] (bound
//! provider plus timeout monitors) is attached exactly once.

use crate::monitor::{AssetManager, MonitorKind, TimeoutMonitor};
use crate::resolve::{BoundProvider, ProviderDescriptor};
use crate::resource::ManagedResource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Lifetime of the objects bound at a site.
///
/// Ordered from narrowest to widest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One object per function invocation.
    Function,
    /// One object per thread unit of work.
    Thread,
    /// One object per process unit of work.
    Process,
    /// One object for the lifetime of the office.
    Global,
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Scope::Function => f.write_str("function"),
            Scope::Thread => f.write_str("thread"),
            Scope::Process => f.write_str("process"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Scope of a site as configured, with the enclosing function for
/// [`Scope::Function`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindScope {
    /// Bound per invocation of the named function.
    Function(String),
    /// Bound per thread unit.
    Thread,
    /// Bound per process unit.
    Process,
    /// Bound for the lifetime of the office.
    Global,
}

impl BindScope {
    /// The scope without its enclosing function.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            BindScope::Function(_) => Scope::Function,
            BindScope::Thread => Scope::Thread,
            BindScope::Process => Scope::Process,
            BindScope::Global => Scope::Global,
        }
    }

    /// Enclosing function of a [`BindScope::Function`] site.
    #[must_use]
    pub fn enclosing(&self) -> Option<&str> {
        match self {
            BindScope::Function(function) => Some(function),
            _ => None,
        }
    }
}

/// Derives the bound name of a site.
///
/// ```
/// use keystone_engine::binding::{Scope, bound_name};
///
/// assert_eq!(bound_name(Scope::Process, None, 0, "db"), "process:0:db");
/// assert_eq!(
///     bound_name(Scope::Function, Some("handle"), 1, "db"),
///     "function:handle:1:db"
/// );
/// ```
#[must_use]
pub fn bound_name(scope: Scope, enclosing: Option<&str>, index: usize, provider: &str) -> String {
    match enclosing {
        Some(enclosing) => format!("{scope}:{enclosing}:{index}:{provider}"),
        None => format!("{scope}:{index}:{provider}"),
    }
}

/// Bound name of the input site the engine creates for an input provider.
#[must_use]
pub fn input_bound_name(provider: &str) -> String {
    format!("input:{provider}")
}

/// Cross-cutting monitor attached to binding sites.
pub trait Governance: Send + Sync + 'static {
    /// Called when an object becomes ready at a governed site.
    fn govern(&self, bound_name: &str, resource: &dyn ManagedResource);

    /// Called when an object of a governed site is recycled.
    fn release(&self, _bound_name: &str) {}
}

/// State attached to a site once its provider is bound.
#[derive(Debug)]
pub struct SiteLifecycle {
    bound: Arc<BoundProvider>,
    sourcing: Arc<TimeoutMonitor>,
    operation: Option<Arc<TimeoutMonitor>>,
}

impl SiteLifecycle {
    /// The provider bound to its managing office.
    #[must_use]
    pub fn bound(&self) -> &Arc<BoundProvider> {
        &self.bound
    }

    /// Monitor watching sourcing.
    #[must_use]
    pub fn sourcing_monitor(&self) -> &Arc<TimeoutMonitor> {
        &self.sourcing
    }

    /// Monitor watching asynchronous operations (asynchronous resources only).
    #[must_use]
    pub fn operation_monitor(&self) -> Option<&Arc<TimeoutMonitor>> {
        self.operation.as_ref()
    }
}

/// Lifecycle metadata of one binding site.
pub struct SiteMetadata {
    bound_name: Arc<str>,
    office: String,
    scope: Scope,
    enclosing: Option<String>,
    index: usize,
    provider: Arc<ProviderDescriptor>,
    dependencies: Vec<String>,
    governance: Vec<Arc<dyn Governance>>,
    input: bool,
    span: tracing::Span,
    lifecycle: OnceLock<SiteLifecycle>,
}

impl core::fmt::Debug for SiteMetadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SiteMetadata")
            .field("bound_name", &self.bound_name)
            .field("office", &self.office)
            .field("provider", &self.provider.name())
            .field("dependencies", &self.dependencies)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

pub(crate) struct SiteSpec {
    pub(crate) bound_name: String,
    pub(crate) office: String,
    pub(crate) scope: Scope,
    pub(crate) enclosing: Option<String>,
    pub(crate) index: usize,
    pub(crate) dependencies: Vec<String>,
    pub(crate) governance: Vec<Arc<dyn Governance>>,
    pub(crate) input: bool,
}

impl SiteMetadata {
    pub(crate) fn new(spec: SiteSpec, provider: Arc<ProviderDescriptor>) -> Self {
        let span = tracing::debug_span!(
            "resource",
            bound_name = %spec.bound_name,
            office = %spec.office,
        );
        Self {
            bound_name: Arc::from(spec.bound_name),
            office: spec.office,
            scope: spec.scope,
            enclosing: spec.enclosing,
            index: spec.index,
            provider,
            dependencies: spec.dependencies,
            governance: spec.governance,
            input: spec.input,
            span,
            lifecycle: OnceLock::new(),
        }
    }

    /// Unique bound name.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        &self.bound_name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.bound_name)
    }

    /// Office the site lives in.
    #[must_use]
    pub fn office(&self) -> &str {
        &self.office
    }

    /// Scope of the site.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Enclosing function of a function-scoped site.
    #[must_use]
    pub fn enclosing(&self) -> Option<&str> {
        self.enclosing.as_deref()
    }

    /// Position among sites of the same scope (and enclosing function).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Descriptor of the bound provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<ProviderDescriptor> {
        &self.provider
    }

    /// Bound names supplying each dependency slot, in slot order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Attached governance.
    #[must_use]
    pub fn governance(&self) -> &[Arc<dyn Governance>] {
        &self.governance
    }

    /// Returns `true` for the input site of an input provider.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.input
    }

    /// Logging span of the site.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Lifecycle state, once finalized.
    #[must_use]
    pub fn lifecycle(&self) -> Option<&SiteLifecycle> {
        self.lifecycle.get()
    }

    /// Returns `true` once the site is finalized.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.lifecycle.get().is_some()
    }

    /// Attaches the lifecycle state. Returns `false` if already finalized.
    pub(crate) fn finalize(&self, bound: &Arc<BoundProvider>, assets: &AssetManager) -> bool {
        if self.lifecycle.get().is_some() {
            return false;
        }
        let timeout = self.provider.timeout();
        let sourcing = assets.create_monitor(&self.bound_name, MonitorKind::Sourcing, timeout);
        let operation = self
            .provider
            .object_type()
            .capabilities()
            .asynchronous
            .then(|| assets.create_monitor(&self.bound_name, MonitorKind::Operation, timeout));
        let finalized = self
            .lifecycle
            .set(SiteLifecycle {
                bound: Arc::clone(bound),
                sourcing,
                operation,
            })
            .is_ok();
        if finalized {
            tracing::debug!(bound_name = %self.bound_name, "binding site finalized");
        }
        finalized
    }
}

enum RegistryState {
    Pending(Vec<Arc<SiteMetadata>>),
    Bound(Arc<BoundProvider>),
    Failed,
}

/// The sites of one provider, finalized together when the provider is bound.
///
/// Sites registered after binding are finalized straight away.
pub(crate) struct SiteRegistry {
    state: Mutex<RegistryState>,
    sites: Mutex<Vec<Arc<SiteMetadata>>>,
}

impl SiteRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::Pending(Vec::new())),
            sites: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, site: Arc<SiteMetadata>, assets: &AssetManager) {
        self.sites.lock().push(Arc::clone(&site));
        let mut state = self.state.lock();
        match &mut *state {
            RegistryState::Pending(pending) => pending.push(site),
            RegistryState::Bound(bound) => {
                site.finalize(bound, assets);
            }
            RegistryState::Failed => {}
        }
    }

    pub(crate) fn bind(&self, bound: Arc<BoundProvider>, assets: &AssetManager) -> usize {
        let mut state = self.state.lock();
        let pending = match core::mem::replace(&mut *state, RegistryState::Bound(Arc::clone(&bound))) {
            RegistryState::Pending(pending) => pending,
            RegistryState::Bound(_) | RegistryState::Failed => Vec::new(),
        };
        pending
            .iter()
            .filter(|site| site.finalize(&bound, assets))
            .count()
    }

    pub(crate) fn fail(&self) {
        *self.state.lock() = RegistryState::Failed;
    }

    pub(crate) fn sites(&self) -> Vec<Arc<SiteMetadata>> {
        self.sites.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_ordered_by_width() {
        assert!(Scope::Function < Scope::Thread);
        assert!(Scope::Thread < Scope::Process);
        assert!(Scope::Process < Scope::Global);
    }

    #[test]
    fn scope_serializes_lowercase() {
        let json = serde_json::to_string(&Scope::Process).unwrap();
        assert_eq!(json, "\"process\"");
        let scope: Scope = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(scope, Scope::Global);
    }

    #[test]
    fn bind_scope_carries_enclosing_function() {
        let scope = BindScope::Function("handle".into());
        assert_eq!(scope.scope(), Scope::Function);
        assert_eq!(scope.enclosing(), Some("handle"));
        assert_eq!(BindScope::Global.enclosing(), None);
        assert_eq!(input_bound_name("http"), "input:http");
    }
}
