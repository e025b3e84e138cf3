//! Fluent configuration of an office floor.
//!
//! ```
//! use keystone_engine::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Settings;
//! impl ManagedResource for Settings {}
//!
//! #[derive(Default)]
//! struct SettingsProvider;
//!
//! impl Provider for SettingsProvider {
//!     fn init(&mut self, _: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
//!         Ok(SourceMetadata::for_object::<Settings>())
//!     }
//!
//!     fn source(&self, sink: SourceSink) {
//!         sink.ready(Settings);
//!     }
//! }
//!
//! let mut builder = OfficeFloorBuilder::new();
//! builder.add_provider("settings", SettingsProvider).office("app");
//! builder.office("app").bind(BindScope::Process, "settings");
//! let floor = builder.build().unwrap();
//! assert!(floor.office("app").is_some());
//! ```

use crate::binding::{BindScope, Governance};
use crate::clock::Clock;
use crate::escalation::Escalation;
use crate::floor::{OfficeFloor, assemble};
use crate::function::{FunctionContext, FunctionDecl};
use crate::issue::AssemblyError;
use crate::pool::{PoolContext, PoolError, PoolFactory, ResourcePool, ThreadCompletionFactory, ThreadCompletionListener};
use crate::property::PropertyList;
use crate::provider::{Provider, ProviderRegistry};
use crate::resolve::FlowRef;
use crate::resolve::source::{DefaultPoolFactory, ProviderSource, ProviderSpec};
use crate::types::ArgType;
use crate::team::Team;
use core::time::Duration;
use std::sync::Arc;

/// Collects providers, offices, teams and governance, then assembles them.
pub struct OfficeFloorBuilder {
    pub(crate) registry: ProviderRegistry,
    pub(crate) providers: Vec<ProviderBuilder>,
    pub(crate) offices: Vec<OfficeBuilder>,
    pub(crate) teams: Vec<(String, Arc<dyn Team>)>,
    pub(crate) governance: Vec<(String, Arc<dyn Governance>)>,
    pub(crate) default_pool: Option<DefaultPoolFactory>,
    pub(crate) clock: Clock,
}

impl Default for OfficeFloorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for OfficeFloorBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfficeFloorBuilder")
            .field("providers", &self.providers.iter().map(|p| &p.spec.name).collect::<Vec<_>>())
            .field("offices", &self.offices.iter().map(|o| &o.name).collect::<Vec<_>>())
            .field("teams", &self.teams.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OfficeFloorBuilder {
    /// Creates an empty builder using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ProviderRegistry::new(),
            providers: Vec::new(),
            offices: Vec::new(),
            teams: Vec::new(),
            governance: Vec::new(),
            default_pool: None,
            clock: Clock::system(),
        }
    }

    /// Provider classes available to [`add_provider_class`](Self::add_provider_class).
    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// Adds a provider instance.
    pub fn add_provider(&mut self, name: impl Into<String>, provider: impl Provider) -> &mut ProviderBuilder {
        self.push_provider(name.into(), ProviderSource::Instance(Box::new(provider)))
    }

    /// Adds a provider instantiated from a registered class during assembly.
    pub fn add_provider_class(&mut self, name: impl Into<String>, class: impl Into<String>) -> &mut ProviderBuilder {
        self.push_provider(name.into(), ProviderSource::Class(class.into()))
    }

    fn push_provider(&mut self, name: String, source: ProviderSource) -> &mut ProviderBuilder {
        let index = self.providers.len();
        self.providers.push(ProviderBuilder {
            spec: ProviderSpec::new(name, source),
        });
        &mut self.providers[index]
    }

    /// The most recently added provider named `name`.
    pub fn provider_mut(&mut self, name: &str) -> Option<&mut ProviderBuilder> {
        self.providers.iter_mut().rev().find(|provider| provider.spec.name == name)
    }

    /// Adds an office, even if one with the same name exists.
    pub fn add_office(&mut self, name: impl Into<String>) -> &mut OfficeBuilder {
        let index = self.offices.len();
        self.offices.push(OfficeBuilder::new(name.into()));
        &mut self.offices[index]
    }

    /// The office named `name`, if added.
    pub fn office_mut(&mut self, name: &str) -> Option<&mut OfficeBuilder> {
        self.offices.iter_mut().find(|office| office.name == name)
    }

    /// The office named `name`, added if missing.
    pub fn office(&mut self, name: &str) -> &mut OfficeBuilder {
        match self.offices.iter().position(|office| office.name == name) {
            Some(index) => &mut self.offices[index],
            None => self.add_office(name),
        }
    }

    /// Adds a team.
    pub fn add_team(&mut self, name: impl Into<String>, team: impl Team) -> &mut Self {
        self.teams.push((name.into(), Arc::new(team)));
        self
    }

    /// Adds a governance that sites can attach by name.
    pub fn add_governance(&mut self, name: impl Into<String>, governance: impl Governance) -> &mut Self {
        self.governance.push((name.into(), Arc::new(governance)));
        self
    }

    /// Pool factory for every non-coordinating provider without a pool of its own.
    pub fn default_pool<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&PoolContext) -> Result<Arc<dyn ResourcePool>, PoolError> + Send + Sync + 'static,
    {
        self.default_pool = Some(Arc::new(factory));
        self
    }

    /// Clock driving the timeout monitors.
    pub fn clock(&mut self, clock: Clock) -> &mut Self {
        self.clock = clock;
        self
    }

    /// Assembles the office floor.
    ///
    /// # Errors
    ///
    /// [`AssemblyError::Issues`] with every configuration issue found, or
    /// [`AssemblyError::ProviderBug`] for a defective provider.
    pub fn build(self) -> Result<OfficeFloor, AssemblyError> {
        assemble(self)
    }
}

/// Configuration of one provider.
pub struct ProviderBuilder {
    pub(crate) spec: ProviderSpec,
}

impl ProviderBuilder {
    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Managing office.
    pub fn office(&mut self, office: impl Into<String>) -> &mut Self {
        self.spec.office = Some(office.into());
        self
    }

    /// Sets a property read by the provider's `init`.
    pub fn property(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.spec.properties.set(name, value);
        self
    }

    /// Adds every property of `properties`.
    pub fn properties(&mut self, properties: &PropertyList) -> &mut Self {
        for (name, value) in properties.iter() {
            self.spec.properties.set(name, value);
        }
        self
    }

    /// Sourcing and asynchronous operation timeout.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.spec.timeout_millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Timeout in milliseconds. Negative values are reported at assembly.
    pub fn timeout_millis(&mut self, millis: i64) -> &mut Self {
        self.spec.timeout_millis = millis;
        self
    }

    /// Pool factory, taking precedence over the provider's own and the default.
    pub fn pool<F>(&mut self, factory: F) -> &mut Self
    where
        F: FnOnce(&PoolContext) -> Result<Arc<dyn ResourcePool>, PoolError> + Send + 'static,
    {
        let factory: PoolFactory = Box::new(factory);
        self.spec.pool = Some(factory);
        self
    }

    /// Listener notified when a thread unit that used the pool completes.
    pub fn thread_completion_listener<F>(&mut self, factory: F) -> &mut Self
    where
        F: FnOnce(&Arc<dyn ResourcePool>) -> Arc<dyn ThreadCompletionListener> + Send + 'static,
    {
        let factory: ThreadCompletionFactory = Box::new(factory);
        self.spec.thread_completion.push(factory);
        self
    }

    /// Creates an input site `input:<name>` in the managing office.
    pub fn input(&mut self) -> &mut Self {
        self.spec.input = true;
        self
    }

    /// Links a flow slot, by index or key, to a function of the managing office.
    pub fn link_flow(&mut self, slot: impl Into<FlowRef>, function: impl Into<String>) -> &mut Self {
        self.spec.flow_links.push((slot.into(), function.into()));
        self
    }

    /// Links an execution group to a team.
    pub fn link_team(&mut self, group: usize, team: impl Into<String>) -> &mut Self {
        self.spec.team_links.push((group, team.into()));
        self
    }

    /// Team for every execution group not linked explicitly.
    pub fn default_team(&mut self, team: impl Into<String>) -> &mut Self {
        self.spec.default_team = Some(team.into());
        self
    }
}

/// Configuration of one office.
pub struct OfficeBuilder {
    pub(crate) name: String,
    pub(crate) functions: Vec<FunctionDecl>,
    pub(crate) sites: Vec<SiteBuilder>,
}

impl OfficeBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            functions: Vec::new(),
            sites: Vec::new(),
        }
    }

    /// Office name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a function.
    pub fn add_function<F>(&mut self, name: impl Into<String>, parameter: Option<ArgType>, handler: F) -> &mut Self
    where
        F: Fn(&mut FunctionContext) -> Result<(), Escalation> + Send + Sync + 'static,
    {
        self.functions.push(FunctionDecl::new(name, parameter, handler));
        self
    }

    /// Adds a declared function.
    pub fn add_function_decl(&mut self, function: FunctionDecl) -> &mut Self {
        self.functions.push(function);
        self
    }

    /// Binds `provider` in `scope`.
    pub fn bind(&mut self, scope: BindScope, provider: impl Into<String>) -> &mut SiteBuilder {
        let index = self.sites.len();
        self.sites.push(SiteBuilder {
            provider: provider.into(),
            scope,
            bound_name: None,
            dependencies: Vec::new(),
            governance: Vec::new(),
        });
        &mut self.sites[index]
    }
}

/// Configuration of one binding site.
pub struct SiteBuilder {
    pub(crate) provider: String,
    pub(crate) scope: BindScope,
    pub(crate) bound_name: Option<String>,
    pub(crate) dependencies: Vec<(usize, String)>,
    pub(crate) governance: Vec<String>,
}

impl SiteBuilder {
    /// Overrides the generated bound name.
    pub fn bound_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.bound_name = Some(name.into());
        self
    }

    /// Maps dependency slot `slot` to the site bound as `bound_name`.
    pub fn depends_on(&mut self, slot: usize, bound_name: impl Into<String>) -> &mut Self {
        self.dependencies.push((slot, bound_name.into()));
        self
    }

    /// Attaches a governance by name.
    pub fn govern(&mut self, governance: impl Into<String>) -> &mut Self {
        self.governance.push(governance.into());
        self
    }
}
