//! The construct-time context handed to [`Provider::init`](super::Provider::init).
//!
//! The context only lives for the duration of `init`: it is borrowed mutably
//! by the provider and consumed by the resolver straight afterwards, so no
//! declaration can be made once initialisation is over.

use super::metadata::{ExecutionGroupSlot, FlowSlot};
use crate::escalation::Escalation;
use crate::function::{FunctionContext, FunctionDecl, namespaced};
use crate::pool::PoolFactory;
use crate::property::{PropertyError, PropertyList};
use crate::types::{ArgType, Argument};
use core::any::Any;

/// A provider implementation violated its contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderBug {
    /// `set_recycle_function` was called more than once.
    #[error("recycle function already declared as '{existing}', cannot redeclare as '{attempted}'")]
    RecycleFunctionAlreadyDeclared {
        /// The first declaration.
        existing: String,
        /// The rejected declaration.
        attempted: String,
    },
}

/// A startup function invocation declared by a provider.
pub struct StartupDecl {
    pub(crate) function: String,
    pub(crate) argument: Option<Argument>,
    pub(crate) argument_type: Option<ArgType>,
}

impl core::fmt::Debug for StartupDecl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StartupDecl")
            .field("function", &self.function)
            .field("argument_type", &self.argument_type)
            .finish_non_exhaustive()
    }
}

/// Everything a provider declared through its [`SourceContext`].
pub(crate) struct DeclaredSource {
    pub(crate) functions: Vec<FunctionDecl>,
    pub(crate) recycle: Option<String>,
    pub(crate) bugs: Vec<ProviderBug>,
    pub(crate) startups: Vec<StartupDecl>,
    pub(crate) pool_factory: Option<PoolFactory>,
    pub(crate) function_dependencies: Vec<(String, String)>,
    pub(crate) flows: Vec<FlowSlot>,
    pub(crate) execution_groups: Vec<ExecutionGroupSlot>,
}

/// Declarations available to a provider while it initialises.
pub struct SourceContext<'a> {
    provider: &'a str,
    properties: &'a PropertyList,
    declared: DeclaredSource,
}

impl core::fmt::Debug for SourceContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourceContext")
            .field("provider", &self.provider)
            .field("properties", self.properties)
            .finish_non_exhaustive()
    }
}

impl<'a> SourceContext<'a> {
    pub(crate) fn new(provider: &'a str, properties: &'a PropertyList) -> Self {
        Self {
            provider,
            properties,
            declared: DeclaredSource {
                functions: Vec::new(),
                recycle: None,
                bugs: Vec::new(),
                startups: Vec::new(),
                pool_factory: None,
                function_dependencies: Vec::new(),
                flows: Vec::new(),
                execution_groups: Vec::new(),
            },
        }
    }

    /// Name the provider was registered under.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider
    }

    /// All configured properties.
    #[must_use]
    pub fn properties(&self) -> &PropertyList {
        self.properties
    }

    /// Looks up a required property.
    ///
    /// # Errors
    ///
    /// [`PropertyError::Missing`] if the property is not configured.
    pub fn property(&self, name: &str) -> Result<&str, PropertyError> {
        self.properties.require(name)
    }

    /// Looks up a property, falling back to `default`.
    #[must_use]
    pub fn property_or<'b>(&'b self, name: &str, default: &'b str) -> &'b str {
        self.properties.get_or(name, default)
    }

    /// Adds a function to the managing office, namespaced under the provider
    /// name. Returns the namespaced name.
    pub fn add_function(
        &mut self,
        name: &str,
        parameter: Option<ArgType>,
        handler: impl Fn(&mut FunctionContext) -> Result<(), Escalation> + Send + Sync + 'static,
    ) -> String {
        let full = namespaced(self.provider, name);
        self.declared
            .functions
            .push(FunctionDecl::new(full.clone(), parameter, handler));
        full
    }

    /// Declares the function run when a bound object is recycled.
    ///
    /// # Errors
    ///
    /// [`ProviderBug::RecycleFunctionAlreadyDeclared`] on a second call. The
    /// defect is recorded even if the error is ignored, and fails assembly.
    pub fn set_recycle_function(&mut self, function: impl Into<String>) -> Result<(), ProviderBug> {
        let attempted = function.into();
        if let Some(existing) = &self.declared.recycle {
            let bug = ProviderBug::RecycleFunctionAlreadyDeclared {
                existing: existing.clone(),
                attempted,
            };
            self.declared.bugs.push(bug.clone());
            return Err(bug);
        }
        self.declared.recycle = Some(attempted);
        Ok(())
    }

    /// Declares a function invoked without argument when the office opens.
    pub fn add_startup_function(&mut self, function: impl Into<String>) {
        self.declared.startups.push(StartupDecl {
            function: function.into(),
            argument: None,
            argument_type: None,
        });
    }

    /// Declares a function invoked with `argument` when the office opens.
    pub fn add_startup_function_with<A: Any + Send + Sync>(
        &mut self,
        function: impl Into<String>,
        argument: A,
    ) {
        self.declared.startups.push(StartupDecl {
            function: function.into(),
            argument: Some(Box::new(argument)),
            argument_type: Some(ArgType::of::<A>()),
        });
    }

    /// Supplies the pool used when no pool is configured on the provider.
    pub fn set_pool_factory(&mut self, factory: PoolFactory) {
        self.declared.pool_factory = Some(factory);
    }

    /// Declares that `function` requires `depends_on` to run first.
    ///
    /// Both are resolved against the managing office once every provider has
    /// initialised, so `depends_on` may be another provider's function.
    pub fn add_function_dependency(
        &mut self,
        function: impl Into<String>,
        depends_on: impl Into<String>,
    ) {
        self.declared
            .function_dependencies
            .push((function.into(), depends_on.into()));
    }

    /// Declares a flow slot after those of the returned metadata.
    pub fn add_flow(&mut self, flow: FlowSlot) {
        self.declared.flows.push(flow);
    }

    /// Declares an execution group after those of the returned metadata.
    pub fn add_execution_group(&mut self, label: impl Into<String>) {
        self.declared
            .execution_groups
            .push(ExecutionGroupSlot::new(label));
    }

    pub(crate) fn close(self) -> DeclaredSource {
        self.declared
    }
}
