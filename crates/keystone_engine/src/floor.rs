//! Office floor assembly and runtime.
//!
//! [`assemble`] turns the configuration accumulated by an
//! [`OfficeFloorBuilder`] into a running [`OfficeFloor`]:
//!
//! 1. offices, teams and governance are registered;
//! 2. every provider goes through phase one;
//! 3. office function tables are completed with provider functions and frozen;
//! 4. office by office, binding sites are created and every provider managed
//!    by the office goes through phase two, finalizing its sites;
//! 5. dependencies between sites are validated.
//!
//! Every issue found on the way is collected. If any was found, nothing runs.

use crate::binding::{Governance, Scope, SiteMetadata, SiteRegistry, SiteSpec, bound_name, input_bound_name};
use crate::builder::{OfficeBuilder, OfficeFloorBuilder, SiteBuilder};
use crate::container::ResourceContainer;
use crate::escalation::{CleanupEscalation, CleanupFailure, Escalation};
use crate::function::FunctionTable;
use crate::issue::{AssemblyError, AssetKind, Issue, Issues};
use crate::monitor::AssetManager;
use crate::provider::SourceError;
use crate::resolve::office::OfficeBinder;
use crate::resolve::source::{SourceEnvironment, resolve_source};
use crate::resolve::{BoundProvider, ProviderDescriptor};
use crate::team::{Team, TeamError};
use crate::timer::FlowTimer;
use crate::types::Argument;
use crate::unit::{UnitOfWork, UnitReport};
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Office
// ─────────────────────────────────────────────────────────────────────────────

/// A running office: its frozen function table, binding sites and global
/// containers.
pub struct Office {
    name: String,
    functions: Arc<FunctionTable>,
    sites: IndexMap<String, Arc<SiteMetadata>>,
    prerequisites: HashMap<String, Vec<String>>,
    globals: Mutex<IndexMap<String, Arc<ResourceContainer>>>,
    timer: Arc<FlowTimer>,
    running: AtomicBool,
    closed: AtomicBool,
}

impl core::fmt::Debug for Office {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Office")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("sites", &self.sites.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Office {
    /// Office name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The frozen function table.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// Looks a binding site up by bound name.
    #[must_use]
    pub fn site(&self, bound_name: &str) -> Option<&Arc<SiteMetadata>> {
        self.sites.get(bound_name)
    }

    /// All binding sites of the office.
    pub fn sites(&self) -> impl Iterator<Item = &Arc<SiteMetadata>> {
        self.sites.values()
    }

    /// Functions that run before `function`.
    #[must_use]
    pub fn prerequisites(&self, function: &str) -> &[String] {
        self.prerequisites
            .get(function)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns `true` while the floor is open. Flows only run then.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns `true` once the floor closed. A closed office hands out no
    /// containers.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn timer(&self) -> &Arc<FlowTimer> {
        &self.timer
    }

    pub(crate) fn closed_escalation(&self, bound_name: &str) -> Escalation {
        Escalation::Unavailable {
            bound_name: bound_name.to_string(),
            reason: format!("office '{}' is closed", self.name),
        }
    }

    /// Starts a process unit of work.
    #[must_use]
    pub fn begin_process(self: &Arc<Self>) -> UnitOfWork {
        UnitOfWork::process(Arc::clone(self))
    }

    /// Runs `function` in a new process unit and completes it.
    ///
    /// A closed office refuses to run anything.
    pub fn invoke(self: &Arc<Self>, function: &str, argument: Option<Argument>) -> UnitReport {
        if self.is_closed() {
            return UnitReport::refused(self.closed_escalation(function));
        }
        let unit = self.begin_process();
        if let Err(escalation) = unit.run(function, argument) {
            unit.escalate(escalation);
        }
        unit.complete()
    }

    pub(crate) fn global_container(
        &self,
        site: &Arc<SiteMetadata>,
    ) -> Result<Arc<ResourceContainer>, Escalation> {
        let mut globals = self.globals.lock();
        if self.is_closed() {
            return Err(self.closed_escalation(site.bound_name()));
        }
        let container = globals
            .entry(site.bound_name().to_string())
            .or_insert_with(|| ResourceContainer::new(Arc::clone(site), None));
        Ok(Arc::clone(container))
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    fn close(&self) -> Vec<CleanupFailure> {
        let globals = {
            let mut globals = self.globals.lock();
            self.closed.store(true, Ordering::Release);
            core::mem::take(&mut *globals)
        };
        globals
            .values()
            .rev()
            .filter_map(|container| container.recycle().err())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OfficeFloor
// ─────────────────────────────────────────────────────────────────────────────

/// Failure to open an office floor.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// `open` was already called.
    #[error("office floor is already open")]
    AlreadyOpen,

    /// The floor was closed.
    #[error("office floor is closed")]
    Closed,

    /// A team failed to start.
    #[error(transparent)]
    Team(#[from] TeamError),

    /// The flow timer thread could not be spawned.
    #[error("failed to spawn the flow timer thread")]
    Timer(#[source] std::io::Error),

    /// A provider failed to start.
    #[error("provider '{provider}' failed to start")]
    ProviderStart {
        /// Provider name.
        provider: String,
        /// Provider error.
        #[source]
        source: SourceError,
    },

    /// A startup function failed.
    #[error("startup function '{function}' failed")]
    Startup {
        /// Function name.
        function: String,
        /// The escalation.
        #[source]
        source: Escalation,
    },
}

/// Failure to close an office floor.
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    /// `close` was already called.
    #[error("office floor is already closed")]
    AlreadyClosed,

    /// Recycling global resources failed.
    #[error(transparent)]
    Cleanup(#[from] CleanupEscalation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FloorState {
    Assembled,
    Open,
    Closed,
}

/// Every office, provider and team of an assembled application.
pub struct OfficeFloor {
    offices: IndexMap<String, Arc<Office>>,
    providers: IndexMap<String, Arc<BoundProvider>>,
    teams: IndexMap<String, Arc<dyn Team>>,
    assets: Arc<AssetManager>,
    timer: Arc<FlowTimer>,
    state: Mutex<FloorState>,
}

impl core::fmt::Debug for OfficeFloor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfficeFloor")
            .field("offices", &self.offices.keys().collect::<Vec<_>>())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("teams", &self.teams.keys().collect::<Vec<_>>())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl OfficeFloor {
    /// Looks an office up by name.
    #[must_use]
    pub fn office(&self, name: &str) -> Option<&Arc<Office>> {
        self.offices.get(name)
    }

    /// All offices in declaration order.
    pub fn offices(&self) -> impl Iterator<Item = &Arc<Office>> {
        self.offices.values()
    }

    /// Looks a bound provider up by name.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&Arc<BoundProvider>> {
        self.providers.get(name)
    }

    /// Descriptor of a provider.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&Arc<ProviderDescriptor>> {
        self.providers.get(name).map(|bound| bound.descriptor())
    }

    /// Looks a team up by name.
    #[must_use]
    pub fn team(&self, name: &str) -> Option<&Arc<dyn Team>> {
        self.teams.get(name)
    }

    /// The owner of every timeout monitor.
    #[must_use]
    pub fn asset_manager(&self) -> &Arc<AssetManager> {
        &self.assets
    }

    /// Polls every timeout monitor. Returns the number of escalations raised.
    pub fn check_timeouts(&self) -> usize {
        self.assets.check()
    }

    /// Returns `true` between a successful [`open`](Self::open) and [`close`](Self::close).
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.state.lock() == FloorState::Open
    }

    /// Starts the flow timer, teams and providers, then runs startup
    /// functions in declaration order. Offices accept flows from here on.
    ///
    /// A floor whose opening failed half way must still be closed.
    ///
    /// # Errors
    ///
    /// [`OpenError`] on the first failure.
    pub fn open(&self) -> Result<(), OpenError> {
        {
            let mut state = self.state.lock();
            match *state {
                FloorState::Assembled => *state = FloorState::Open,
                FloorState::Open => return Err(OpenError::AlreadyOpen),
                FloorState::Closed => return Err(OpenError::Closed),
            }
        }

        for office in self.offices.values() {
            office.set_running(true);
        }
        self.timer.start().map_err(OpenError::Timer)?;
        for team in self.teams.values() {
            team.start()?;
        }
        for (name, bound) in &self.providers {
            bound
                .descriptor()
                .provider()
                .start(Arc::clone(bound.execute()))
                .map_err(|source| OpenError::ProviderStart {
                    provider: name.clone(),
                    source,
                })?;
        }
        for bound in self.providers.values() {
            let Some(office) = self.offices.get(bound.descriptor().office()) else {
                continue;
            };
            for startup in bound.startups() {
                let function = startup.function().name();
                tracing::debug!(provider = %bound.descriptor().name(), %function, "running startup function");
                office
                    .invoke(function, startup.take_argument())
                    .into_result()
                    .map_err(|source| OpenError::Startup {
                        function: function.to_string(),
                        source,
                    })?;
            }
        }
        tracing::info!(offices = self.offices.len(), providers = self.providers.len(), "office floor open");
        Ok(())
    }

    /// Stops accepting flows, cancels delayed flows, stops providers,
    /// recycles global resources and stops teams.
    ///
    /// # Errors
    ///
    /// [`CloseError::Cleanup`] listing every global resource that failed to
    /// recycle. Teams are stopped regardless.
    pub fn close(&self) -> Result<(), CloseError> {
        {
            let mut state = self.state.lock();
            if *state == FloorState::Closed {
                return Err(CloseError::AlreadyClosed);
            }
            *state = FloorState::Closed;
        }

        for office in self.offices.values() {
            office.set_running(false);
        }
        self.timer.stop();
        for bound in self.providers.values().rev() {
            bound.descriptor().provider().stop();
        }
        let failures: Vec<_> = self
            .offices
            .values()
            .flat_map(|office| office.close())
            .collect();
        for team in self.teams.values() {
            team.stop();
        }
        tracing::info!("office floor closed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError::Cleanup(CleanupEscalation::new(failures)))
        }
    }
}

impl Drop for OfficeFloor {
    fn drop(&mut self) {
        for office in self.offices.values() {
            office.set_running(false);
        }
        self.timer.stop();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────────────────────────────────────

fn register_named<T: ?Sized>(
    kind: AssetKind,
    entries: Vec<(String, Arc<T>)>,
    issues: &mut Issues,
) -> IndexMap<String, Arc<T>> {
    let mut registered = IndexMap::new();
    for (name, entry) in entries {
        if name.trim().is_empty() {
            issues.report(kind, &name, "added without a name");
        } else if registered.contains_key(&name) {
            issues.report(kind, &name, "added more than once");
        } else {
            registered.insert(name, entry);
        }
    }
    registered
}

/// Assembles an office floor. Called by [`OfficeFloorBuilder::build`].
pub(crate) fn assemble(builder: OfficeFloorBuilder) -> Result<OfficeFloor, AssemblyError> {
    let OfficeFloorBuilder {
        registry,
        providers,
        offices,
        teams,
        governance,
        default_pool,
        clock,
    } = builder;
    let mut issues = Issues::new();
    let assets = Arc::new(AssetManager::new(clock));
    let timer = Arc::new(FlowTimer::new());

    let mut office_names = HashSet::new();
    let mut office_specs: Vec<OfficeBuilder> = Vec::new();
    for office in offices {
        if office.name.trim().is_empty() {
            issues.report(AssetKind::Office, &office.name, "added without a name");
        } else if !office_names.insert(office.name.clone()) {
            issues.report(AssetKind::Office, &office.name, "added more than once");
        } else {
            office_specs.push(office);
        }
    }
    let teams = register_named(AssetKind::Team, teams, &mut issues);
    let governance = register_named(AssetKind::BindingSite, governance, &mut issues);

    // Phase one, for every provider.
    let environment = SourceEnvironment {
        registry: &registry,
        offices: &office_names,
        default_pool: default_pool.as_ref(),
    };
    let mut declared_providers = HashSet::new();
    let mut descriptors: IndexMap<String, Arc<ProviderDescriptor>> = IndexMap::new();
    let mut binders: IndexMap<String, OfficeBinder> = IndexMap::new();
    let mut provider_functions = Vec::new();
    for provider in providers {
        let name = provider.spec.name.clone();
        if !name.trim().is_empty() && !declared_providers.insert(name.clone()) {
            issues.report(AssetKind::Provider, &name, "added more than once");
            continue;
        }
        if let Some(sourced) = resolve_source(provider.spec, &environment, &mut issues)? {
            provider_functions.push((sourced.descriptor.office().to_string(), sourced.functions));
            descriptors.insert(name.clone(), sourced.descriptor);
            binders.insert(name, sourced.binder);
        }
    }

    // Function tables, frozen before any phase two.
    let mut tables: IndexMap<String, FunctionTable> = IndexMap::new();
    for office in &mut office_specs {
        let mut table = FunctionTable::new();
        for function in core::mem::take(&mut office.functions) {
            let name = function.name().to_string();
            if !table.insert(function) {
                issues.report(
                    AssetKind::Function,
                    &name,
                    format!("declared more than once in office '{}'", office.name),
                );
            }
        }
        tables.insert(office.name.clone(), table);
    }
    for (office, functions) in provider_functions {
        let Some(table) = tables.get_mut(&office) else {
            continue;
        };
        for function in functions {
            let name = function.name().to_string();
            if !table.insert(function) {
                issues.report(
                    AssetKind::Function,
                    &name,
                    format!("declared more than once in office '{office}'"),
                );
            }
        }
    }
    let tables: IndexMap<String, Arc<FunctionTable>> = tables
        .into_iter()
        .map(|(name, table)| (name, Arc::new(table)))
        .collect();

    let registries: IndexMap<String, SiteRegistry> = descriptors
        .keys()
        .map(|name| (name.clone(), SiteRegistry::new()))
        .collect();

    // Sites and phase two, office by office.
    let mut context = SiteAssembly {
        descriptors: &descriptors,
        declared_providers: &declared_providers,
        governance: &governance,
        registries: &registries,
        assets: &assets,
        counters: HashMap::new(),
        bound_names: HashSet::new(),
    };
    let mut bound: IndexMap<String, Arc<BoundProvider>> = IndexMap::new();
    let mut office_sites: IndexMap<String, IndexMap<String, Arc<SiteMetadata>>> = IndexMap::new();
    for office in &office_specs {
        let table = &tables[office.name.as_str()];
        let sites = context.create_sites(office, table, &mut issues);

        let managed: Vec<String> = binders
            .iter()
            .filter(|(_, binder)| binder.descriptor.office() == office.name)
            .map(|(name, _)| name.clone())
            .collect();
        for name in managed {
            let Some(binder) = binders.shift_remove(&name) else {
                continue;
            };
            let registry = &registries[name.as_str()];
            match binder.bind(table, &teams, &mut issues) {
                Some(provider) => {
                    let provider = Arc::new(provider);
                    registry.bind(Arc::clone(&provider), &assets);
                    bound.insert(name, provider);
                }
                None => registry.fail(),
            }
        }
        office_sites.insert(office.name.clone(), sites);
    }

    validate_dependencies(&office_sites, &mut issues);

    for (provider, registry) in &registries {
        for site in registry.sites() {
            if !site.is_finalized() {
                issues.report(
                    AssetKind::BindingSite,
                    site.bound_name(),
                    format!("provider '{provider}' could not be bound to its office"),
                );
            }
        }
    }

    if !issues.is_empty() {
        for issue in issues.iter() {
            tracing::debug!(%issue, "assembly issue");
        }
        return Err(AssemblyError::Issues(issues.into_vec()));
    }

    let mut prerequisites: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
    for provider in bound.values() {
        let descriptor = provider.descriptor();
        let office = prerequisites.entry(descriptor.office().to_string()).or_default();
        for (function, depends_on) in descriptor.function_dependencies() {
            office
                .entry(function.clone())
                .or_default()
                .push(depends_on.clone());
        }
    }

    let offices: IndexMap<String, Arc<Office>> = office_specs
        .into_iter()
        .map(|spec| {
            let name = spec.name;
            let office = Arc::new(Office {
                functions: Arc::clone(&tables[name.as_str()]),
                sites: office_sites.shift_remove(&name).unwrap_or_default(),
                prerequisites: prerequisites.remove(&name).unwrap_or_default(),
                globals: Mutex::new(IndexMap::new()),
                timer: Arc::clone(&timer),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                name: name.clone(),
            });
            (name, office)
        })
        .collect();
    for provider in bound.values() {
        if let Some(office) = offices.get(provider.descriptor().office()) {
            provider.execute().attach(Arc::downgrade(office));
        }
    }

    tracing::debug!(
        offices = offices.len(),
        providers = bound.len(),
        monitors = assets.monitor_count(),
        "office floor assembled"
    );
    Ok(OfficeFloor {
        offices,
        providers: bound,
        teams,
        assets,
        timer,
        state: Mutex::new(FloorState::Assembled),
    })
}

struct SiteAssembly<'a> {
    descriptors: &'a IndexMap<String, Arc<ProviderDescriptor>>,
    declared_providers: &'a HashSet<String>,
    governance: &'a IndexMap<String, Arc<dyn Governance>>,
    registries: &'a IndexMap<String, SiteRegistry>,
    assets: &'a AssetManager,
    counters: HashMap<(Scope, Option<String>), usize>,
    bound_names: HashSet<String>,
}

impl SiteAssembly<'_> {
    fn create_sites(
        &mut self,
        office: &OfficeBuilder,
        table: &FunctionTable,
        issues: &mut Issues,
    ) -> IndexMap<String, Arc<SiteMetadata>> {
        let mut sites = IndexMap::new();

        for (name, descriptor) in self.descriptors {
            if descriptor.office() != office.name || !descriptor.is_input() {
                continue;
            }
            let spec = SiteSpec {
                bound_name: input_bound_name(name),
                office: office.name.clone(),
                scope: Scope::Process,
                enclosing: None,
                index: 0,
                dependencies: Vec::new(),
                governance: Vec::new(),
                input: true,
            };
            if let Some(site) = self.register(spec, descriptor, issues) {
                sites.insert(site.bound_name().to_string(), site);
            }
        }

        for site in &office.sites {
            if let Some(site) = self.create_site(office, site, table, issues) {
                sites.insert(site.bound_name().to_string(), site);
            }
        }
        sites
    }

    fn create_site(
        &mut self,
        office: &OfficeBuilder,
        site: &SiteBuilder,
        table: &FunctionTable,
        issues: &mut Issues,
    ) -> Option<Arc<SiteMetadata>> {
        let label = site
            .bound_name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", site.provider, office.name));
        let Some(descriptor) = self.descriptors.get(&site.provider) else {
            let message = if self.declared_providers.contains(&site.provider) {
                format!("provider '{}' is not available", site.provider)
            } else {
                format!("unknown provider '{}'", site.provider)
            };
            issues.report(AssetKind::BindingSite, &label, message);
            return None;
        };

        let scope = site.scope.scope();
        let enclosing = site.scope.enclosing().map(str::to_string);
        if let Some(function) = &enclosing
            && !table.contains(function)
        {
            issues.report(
                AssetKind::BindingSite,
                &label,
                format!("enclosing function '{function}' is not in office '{}'", office.name),
            );
            return None;
        }

        let counter = self.counters.entry((scope, enclosing.clone())).or_default();
        let index = *counter;
        *counter += 1;
        let name = site
            .bound_name
            .clone()
            .unwrap_or_else(|| bound_name(scope, enclosing.as_deref(), index, &site.provider));

        let before = issues.len();
        let slots = descriptor.dependencies().len();
        let mut dependencies: Vec<Option<String>> = vec![None; slots];
        for (slot, target) in &site.dependencies {
            match dependencies.get_mut(*slot) {
                None => issues.report(
                    AssetKind::BindingSite,
                    &name,
                    format!("extra dependency configured for slot {slot}"),
                ),
                Some(Some(_)) => issues.report(
                    AssetKind::BindingSite,
                    &name,
                    format!("dependency slot {slot} is mapped more than once"),
                ),
                Some(entry) => *entry = Some(target.clone()),
            }
        }
        for (slot, dependency) in dependencies.iter().enumerate() {
            if dependency.is_none() {
                issues.report(
                    AssetKind::BindingSite,
                    &name,
                    format!("no dependency configured for slot {slot}"),
                );
            }
        }

        let mut governance = Vec::with_capacity(site.governance.len());
        for attachment in &site.governance {
            match self.governance.get(attachment) {
                Some(governance_ref) => governance.push(Arc::clone(governance_ref)),
                None => issues.report(
                    AssetKind::BindingSite,
                    &name,
                    format!("unknown governance '{attachment}'"),
                ),
            }
        }
        if issues.len() != before {
            return None;
        }

        let spec = SiteSpec {
            bound_name: name,
            office: office.name.clone(),
            scope,
            enclosing,
            index,
            dependencies: dependencies.into_iter().flatten().collect(),
            governance,
            input: false,
        };
        self.register(spec, descriptor, issues)
    }

    fn register(
        &mut self,
        spec: SiteSpec,
        descriptor: &Arc<ProviderDescriptor>,
        issues: &mut Issues,
    ) -> Option<Arc<SiteMetadata>> {
        if !self.bound_names.insert(spec.bound_name.clone()) {
            issues.report(AssetKind::BindingSite, &spec.bound_name, "bound name is not unique");
            return None;
        }
        let site = Arc::new(SiteMetadata::new(spec, Arc::clone(descriptor)));
        if let Some(registry) = self.registries.get(descriptor.name()) {
            registry.register(Arc::clone(&site), self.assets);
        }
        Some(site)
    }
}

/// Checks that every dependency is a site of the same office, of equal or
/// wider scope, of the declared type, and that dependencies form no cycle.
fn validate_dependencies(
    office_sites: &IndexMap<String, IndexMap<String, Arc<SiteMetadata>>>,
    issues: &mut Issues,
) {
    for (office, sites) in office_sites {
        for site in sites.values() {
            let declared = site.provider().dependencies();
            for (slot, dependency) in site.dependencies().iter().enumerate() {
                let Some(target) = sites.get(dependency) else {
                    issues.report(
                        AssetKind::BindingSite,
                        site.bound_name(),
                        format!("dependency '{dependency}' is not bound in office '{office}'"),
                    );
                    continue;
                };
                if target.scope() < site.scope() {
                    issues.report(
                        AssetKind::BindingSite,
                        site.bound_name(),
                        format!(
                            "depends on '{dependency}' of narrower {} scope",
                            target.scope()
                        ),
                    );
                }
                if let Some(slot_type) = declared.get(slot).map(|d| d.dependency_type())
                    && !slot_type.accepts(&target.provider().object_type().arg_type())
                {
                    issues.report(
                        AssetKind::BindingSite,
                        site.bound_name(),
                        format!(
                            "dependency slot {slot} expects {slot_type} but '{dependency}' supplies {}",
                            target.provider().object_type().type_name()
                        ),
                    );
                }
            }
        }

        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for name in sites.keys() {
            if let Some(cycle) = find_cycle(name, sites, &mut visiting, &mut done) {
                issues.push(Issue::new(
                    AssetKind::BindingSite,
                    name.as_str(),
                    format!("dependency cycle through '{cycle}'"),
                ));
            }
        }
    }
}

fn find_cycle<'a>(
    name: &'a str,
    sites: &'a IndexMap<String, Arc<SiteMetadata>>,
    visiting: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<&'a str> {
    if done.contains(name) {
        return None;
    }
    if !visiting.insert(name) {
        return Some(name);
    }
    let cycle = sites.get(name).and_then(|site| {
        site.dependencies()
            .iter()
            .find_map(|dependency| find_cycle(dependency, sites, visiting, done))
    });
    visiting.remove(name);
    done.insert(name);
    cycle
}
