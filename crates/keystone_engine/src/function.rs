//! The host graph: named functions of an office.
//!
//! An office is, for the purposes of this engine, a table of named functions
//! with introspectable parameter types. Functions are declared by assembly
//! code through [`OfficeBuilder`](crate::builder::OfficeBuilder) and by
//! providers during initialisation (namespaced under the provider name). Once
//! every provider has been initialised the table is frozen behind an `Arc` and
//! shared read-only by all resolvers and runtime objects.

use crate::escalation::Escalation;
use crate::types::{ArgType, Argument};
use crate::unit::UnitOfWork;
use core::any::Any;
use indexmap::IndexMap;
use std::sync::Arc;

/// Signature of a function body.
pub type FunctionHandler = Arc<dyn Fn(&mut FunctionContext) -> Result<(), Escalation> + Send + Sync>;

/// Builds the namespaced name of a provider-added function.
#[must_use]
pub fn namespaced(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}")
}

/// Per-invocation state handed to a function body.
#[derive(Debug)]
pub struct FunctionContext {
    function: String,
    argument: Option<Argument>,
    unit: Option<UnitOfWork>,
}

impl FunctionContext {
    /// Creates a context for invoking `function` with `argument`.
    #[must_use]
    pub fn new(function: impl Into<String>, argument: Option<Argument>) -> Self {
        Self {
            function: function.into(),
            argument,
            unit: None,
        }
    }

    /// Runs the function inside `unit`.
    #[must_use]
    pub fn with_unit(mut self, unit: UnitOfWork) -> Self {
        self.unit = Some(unit);
        self
    }

    /// The unit of work of this invocation, through which bound resources
    /// are acquired. `None` for recycle functions.
    #[must_use]
    pub fn unit(&self) -> Option<&UnitOfWork> {
        self.unit.as_ref()
    }

    /// Name of the function being invoked.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Borrows the argument as `T`.
    #[must_use]
    pub fn argument<T: Any>(&self) -> Option<&T> {
        self.argument.as_deref().and_then(|a| a.downcast_ref::<T>())
    }

    /// Mutably borrows the argument as `T`.
    pub fn argument_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.argument.as_deref_mut().and_then(|a| a.downcast_mut::<T>())
    }

    /// Takes the argument out if it is a `T`; otherwise leaves it in place.
    pub fn take_argument<T: Any>(&mut self) -> Option<T> {
        let argument = self.argument.take()?;
        match argument.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.argument = Some(other);
                None
            }
        }
    }

    /// Returns whatever argument is left after the function ran.
    #[must_use]
    pub fn into_argument(self) -> Option<Argument> {
        self.argument
    }

    /// Shorthand for [`Escalation::failed`] naming this function.
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> Escalation {
        Escalation::failed(self.function.clone(), message)
    }
}

/// A named function and its accepted parameter type.
#[derive(Clone)]
pub struct FunctionDecl {
    name: String,
    parameter: Option<ArgType>,
    handler: FunctionHandler,
}

impl core::fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("name", &self.name)
            .field("parameter", &self.parameter)
            .finish_non_exhaustive()
    }
}

impl FunctionDecl {
    /// Declares a function. `parameter` is `None` for functions that take no argument.
    pub fn new(
        name: impl Into<String>,
        parameter: Option<ArgType>,
        handler: impl Fn(&mut FunctionContext) -> Result<(), Escalation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            parameter,
            handler: Arc::new(handler),
        }
    }

    /// Function name (namespaced for provider-added functions).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted parameter type.
    #[must_use]
    pub fn parameter(&self) -> Option<ArgType> {
        self.parameter
    }

    /// Copy of this declaration with the parameter type replaced.
    #[must_use]
    pub fn with_parameter(&self, parameter: Option<ArgType>) -> Self {
        Self {
            name: self.name.clone(),
            parameter,
            handler: Arc::clone(&self.handler),
        }
    }

    /// Runs the function on the calling thread.
    ///
    /// # Errors
    ///
    /// [`Escalation::ArgumentMismatch`] if the argument does not suit the
    /// parameter type, otherwise whatever the body returns.
    pub fn invoke(&self, context: &mut FunctionContext) -> Result<(), Escalation> {
        if let (Some(parameter), Some(argument)) = (self.parameter, context.argument.as_ref())
            && !parameter.accepts_argument(argument)
        {
            return Err(Escalation::ArgumentMismatch {
                function: self.name.clone(),
                expected: parameter.type_name(),
            });
        }
        (self.handler)(context)
    }
}

/// The function table of one office.
#[derive(Debug, Default, Clone)]
pub struct FunctionTable {
    functions: IndexMap<String, Arc<FunctionDecl>>,
}

impl FunctionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }

    /// Adds a function. Returns `false` (and keeps the existing one) if the
    /// name is already taken.
    pub fn insert(&mut self, function: FunctionDecl) -> bool {
        if self.functions.contains_key(function.name()) {
            return false;
        }
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
        true
    }

    /// Looks a function up by (namespaced) name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<FunctionDecl>> {
        self.functions.get(name)
    }

    /// Introspects the parameter type of a function.
    ///
    /// The outer `Option` is `None` if the function does not exist.
    #[must_use]
    pub fn parameter_type(&self, name: &str) -> Option<Option<ArgType>> {
        self.get(name).map(|f| f.parameter())
    }

    /// Returns `true` if the function exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
