//! Phase one: provider metadata resolution.
//!
//! Instantiates and initialises a provider independently of any office
//! function table, validates what it declared and freezes the result into a
//! [`ProviderDescriptor`]. The office-dependent part of the work is deferred
//! into an [`OfficeBinder`].

use super::office::{FlowRef, OfficeBinder};
use crate::function::FunctionDecl;
use crate::issue::{AssemblyError, AssetKind, Issue, Issues};
use crate::pool::{PoolContext, PoolDescriptor, PoolError, PoolFactory, ResourcePool, ThreadCompletionFactory};
use crate::property::PropertyList;
use crate::provider::{
    DependencySlot, ExecutionGroupSlot, FlowSlot, Provider, ProviderRegistry, SourceContext,
    SourceError,
};
use crate::resource::{Capabilities, ObjectType};
use core::time::Duration;
use hashbrown::HashSet;
use std::sync::Arc;

/// Pool factory applied to every provider without a pool of its own.
pub type DefaultPoolFactory =
    Arc<dyn Fn(&PoolContext) -> Result<Arc<dyn ResourcePool>, PoolError> + Send + Sync>;

pub(crate) enum ProviderSource {
    Instance(Box<dyn Provider>),
    Class(String),
}

/// Everything configured for a provider before assembly.
pub(crate) struct ProviderSpec {
    pub(crate) name: String,
    pub(crate) source: ProviderSource,
    pub(crate) office: Option<String>,
    pub(crate) properties: PropertyList,
    pub(crate) timeout_millis: i64,
    pub(crate) pool: Option<PoolFactory>,
    pub(crate) thread_completion: Vec<ThreadCompletionFactory>,
    pub(crate) input: bool,
    pub(crate) flow_links: Vec<(FlowRef, String)>,
    pub(crate) team_links: Vec<(usize, String)>,
    pub(crate) default_team: Option<String>,
}

impl ProviderSpec {
    pub(crate) fn new(name: String, source: ProviderSource) -> Self {
        Self {
            name,
            source,
            office: None,
            properties: PropertyList::new(),
            timeout_millis: 0,
            pool: None,
            thread_completion: Vec::new(),
            input: false,
            flow_links: Vec::new(),
            team_links: Vec::new(),
            default_team: None,
        }
    }
}

/// Frozen metadata of an initialised provider.
///
/// Exactly one exists per provider name. It is shared by every binding site
/// of the provider, in any office.
pub struct ProviderDescriptor {
    name: String,
    office: String,
    object_type: ObjectType,
    dependencies: Vec<DependencySlot>,
    flows: Vec<FlowSlot>,
    execution_groups: Vec<ExecutionGroupSlot>,
    recycle: Option<String>,
    startup_functions: Vec<String>,
    function_dependencies: Vec<(String, String)>,
    timeout: Duration,
    pool: Option<PoolDescriptor>,
    input: bool,
    provider: Arc<dyn Provider>,
}

impl core::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("office", &self.office)
            .field("object_type", &self.object_type.type_name())
            .field("flows", &self.flows.len())
            .field("execution_groups", &self.execution_groups.len())
            .field("timeout", &self.timeout)
            .field("poolable", &self.is_poolable())
            .finish_non_exhaustive()
    }
}

impl ProviderDescriptor {
    /// Unique provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Managing office.
    #[must_use]
    pub fn office(&self) -> &str {
        &self.office
    }

    /// Supplied object type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Intrinsic capabilities of the supplied objects.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.object_type.capabilities()
    }

    /// Returns `true` if the objects are pooled.
    #[must_use]
    pub fn is_poolable(&self) -> bool {
        self.pool.is_some()
    }

    /// Declared dependency slots.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencySlot] {
        &self.dependencies
    }

    /// Declared flow slots, metadata first, then context declarations.
    #[must_use]
    pub fn flows(&self) -> &[FlowSlot] {
        &self.flows
    }

    /// Declared execution group slots.
    #[must_use]
    pub fn execution_groups(&self) -> &[ExecutionGroupSlot] {
        &self.execution_groups
    }

    /// Name of the recycle function, if declared.
    #[must_use]
    pub fn recycle_function(&self) -> Option<&str> {
        self.recycle.as_deref()
    }

    /// Startup functions in declaration order.
    #[must_use]
    pub fn startup_functions(&self) -> &[String] {
        &self.startup_functions
    }

    /// Declared `(function, depends_on)` pairs.
    #[must_use]
    pub fn function_dependencies(&self) -> &[(String, String)] {
        &self.function_dependencies
    }

    /// Sourcing (and asynchronous operation) timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PoolDescriptor> {
        self.pool.as_ref()
    }

    /// Returns `true` if an input site is configured.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.input
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }
}

/// Output of phase one.
pub(crate) struct SourcedProvider {
    pub(crate) descriptor: Arc<ProviderDescriptor>,
    pub(crate) functions: Vec<FunctionDecl>,
    pub(crate) binder: OfficeBinder,
}

/// What phase one needs from the floor being assembled.
pub(crate) struct SourceEnvironment<'a> {
    pub(crate) registry: &'a ProviderRegistry,
    pub(crate) offices: &'a HashSet<String>,
    pub(crate) default_pool: Option<&'a DefaultPoolFactory>,
}

/// Runs phase one for a single provider.
///
/// Configuration problems are pushed onto `issues` and yield `Ok(None)`.
/// Provider bugs abort assembly.
pub(crate) fn resolve_source(
    spec: ProviderSpec,
    environment: &SourceEnvironment<'_>,
    issues: &mut Issues,
) -> Result<Option<SourcedProvider>, AssemblyError> {
    let ProviderSpec {
        name,
        source,
        office,
        properties,
        timeout_millis,
        pool,
        thread_completion,
        input,
        flow_links,
        team_links,
        default_team,
    } = spec;

    if name.trim().is_empty() {
        issues.report(AssetKind::Provider, &name, "added without a name");
        return Ok(None);
    }

    let mut provider = match source {
        ProviderSource::Instance(provider) => provider,
        ProviderSource::Class(class) => match environment.registry.instantiate(&class, &properties) {
            Ok(provider) => provider,
            Err(error) => {
                issues.push(
                    Issue::new(AssetKind::Provider, &name, "failed to instantiate provider")
                        .with_cause(error),
                );
                return Ok(None);
            }
        },
    };

    let Some(office) = office else {
        issues.report(AssetKind::Provider, &name, "no managing office configured");
        return Ok(None);
    };
    if !environment.offices.contains(&office) {
        issues.report(
            AssetKind::Provider,
            &name,
            format!("unknown managing office '{office}'"),
        );
        return Ok(None);
    }

    let mut context = SourceContext::new(&name, &properties);
    let metadata = provider.init(&mut context);
    let declared = context.close();
    if let Some(bug) = declared.bugs.into_iter().next() {
        return Err(AssemblyError::ProviderBug {
            provider: name,
            bug,
        });
    }
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(SourceError::Bug(bug)) => {
            return Err(AssemblyError::ProviderBug {
                provider: name,
                bug,
            });
        }
        Err(error) => {
            issues.push(
                Issue::new(AssetKind::Provider, &name, "failed to initialise").with_cause(error),
            );
            return Ok(None);
        }
    };
    let (object_type, dependencies, mut flows, mut execution_groups) = metadata.into_parts();
    flows.extend(declared.flows);
    execution_groups.extend(declared.execution_groups);

    if timeout_millis < 0 {
        issues.report(
            AssetKind::Provider,
            &name,
            format!("timeout must not be negative (got {timeout_millis}ms)"),
        );
        return Ok(None);
    }
    let timeout = Duration::from_millis(timeout_millis.unsigned_abs());
    if object_type.capabilities().asynchronous && timeout.is_zero() {
        issues.report(
            AssetKind::Provider,
            &name,
            "asynchronous provider requires a timeout greater than zero",
        );
        return Ok(None);
    }

    if !flows.is_empty() && !input {
        issues.report(
            AssetKind::Provider,
            &name,
            "requires flows but no input binding configured",
        );
        return Ok(None);
    }
    if flows.is_empty() && input {
        issues.report(
            AssetKind::Provider,
            &name,
            "input binding configured but provider declares no flows",
        );
        return Ok(None);
    }

    let pool_context = PoolContext::new(&name, object_type);
    let created = if let Some(factory) = pool.or(declared.pool_factory) {
        Some(factory(&pool_context))
    } else if let Some(default) = environment.default_pool
        && !object_type.capabilities().coordinating
    {
        Some(default(&pool_context))
    } else {
        None
    };
    let pool = match created {
        Some(Ok(pool)) => {
            let listeners = thread_completion
                .into_iter()
                .map(|factory| factory(&pool))
                .collect();
            Some(PoolDescriptor::new(pool, listeners))
        }
        Some(Err(error)) => {
            issues.push(
                Issue::new(AssetKind::Provider, &name, "failed to create pool").with_cause(error),
            );
            return Ok(None);
        }
        None if !thread_completion.is_empty() => {
            issues.report(
                AssetKind::Provider,
                &name,
                "thread completion listener configured without a pool",
            );
            return Ok(None);
        }
        None => None,
    };

    let startup_functions = declared
        .startups
        .iter()
        .map(|startup| startup.function.clone())
        .collect();

    tracing::debug!(
        provider = %name,
        office = %office,
        object_type = object_type.type_name(),
        flows = flows.len(),
        execution_groups = execution_groups.len(),
        poolable = pool.is_some(),
        "provider initialised"
    );

    let descriptor = Arc::new(ProviderDescriptor {
        name,
        office,
        object_type,
        dependencies,
        flows,
        execution_groups,
        recycle: declared.recycle,
        startup_functions,
        function_dependencies: declared.function_dependencies,
        timeout,
        pool,
        input,
        provider: Arc::from(provider),
    });

    Ok(Some(SourcedProvider {
        binder: OfficeBinder {
            descriptor: Arc::clone(&descriptor),
            startups: declared.startups,
            flow_links,
            team_links,
            default_team,
        },
        descriptor,
        functions: declared.functions,
    }))
}
