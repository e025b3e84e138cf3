//! Two-phase binding and lifecycle coordination of managed resources.
//!
//! `keystone_engine` binds objects supplied by *providers* into *offices*
//! (named tables of functions) and drives their lifecycle:
//!
//! - [`provider`] - the provider contract and its construct-time context
//! - [`resolve`] - phase one (metadata) and phase two (office binding)
//! - [`binding`] - binding sites, scopes and their lifecycle metadata
//! - [`container`] - per-instance state machine of a bound object
//! - [`unit`] - units of work owning and recycling containers
//! - [`execute`] - the runtime entry point providers invoke flows through
//! - [`monitor`] - timeout monitors polled against a [`clock::Clock`]
//! - [`builder`] / [`config`] - programmatic and declarative configuration
//! - [`floor`] - assembly and the running [`floor::OfficeFloor`]
//!
//! # Phases
//!
//! Every provider is initialised exactly once, independently of any office.
//! Only once an office's function table is frozen are its providers bound
//! to it, producing one [`execute::ExecuteContext`] per provider. Every
//! configuration issue found on the way is collected and returned together
//! from [`builder::OfficeFloorBuilder::build`]; nothing runs partially
//! assembled.
//!
//! # Example
//!
//! ```
//! use keystone_engine::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter(u64);
//! impl ManagedResource for Counter {}
//!
//! #[derive(Default)]
//! struct CounterProvider;
//!
//! impl Provider for CounterProvider {
//!     fn init(&mut self, _: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
//!         Ok(SourceMetadata::for_object::<Counter>())
//!     }
//!
//!     fn source(&self, sink: SourceSink) {
//!         sink.ready(Counter::default());
//!     }
//! }
//!
//! let mut builder = OfficeFloorBuilder::new();
//! builder.add_provider("counter", CounterProvider).office("app");
//! let app = builder.office("app");
//! app.bind(BindScope::Process, "counter").bound_name("counter");
//! app.add_function("increment", None, |context| {
//!     let unit = context.unit().ok_or_else(|| context.fail("no unit of work"))?;
//!     let counter = unit.acquire_blocking("counter", None)?;
//!     if let Some(mut counter) = counter.object_mut::<Counter>() {
//!         counter.0 += 1;
//!     }
//!     Ok(())
//! });
//!
//! let floor = builder.build().unwrap();
//! floor.open().unwrap();
//! let report = floor.office("app").unwrap().invoke("increment", None);
//! assert!(report.is_success());
//! floor.close().unwrap();
//! ```

/// Lifetimes of bound objects and per-site lifecycle metadata.
pub mod binding;

/// Fluent floor configuration.
pub mod builder;

/// Time source of the timeout monitors.
pub mod clock;

/// Declarative JSON floor configuration.
pub mod config;

/// Per-instance state machine.
pub mod container;

/// Runtime escalations.
pub mod escalation;

/// Runtime flow invocation.
pub mod execute;

/// Floor assembly and runtime offices.
pub mod floor;

/// Office functions.
pub mod function;

/// Configuration issues.
pub mod issue;

/// Timeout monitors.
pub mod monitor;

/// Resource pooling.
pub mod pool;

/// Provider configuration properties.
pub mod property;

/// The provider contract.
pub mod provider;

/// Provider resolution phases.
pub mod resolve;

/// The managed object contract.
pub mod resource;

/// Execution groups.
pub mod team;

/// Delayed flow timer.
pub mod timer;

/// Runtime argument types.
pub mod types;

/// Units of work.
pub mod unit;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::binding::{BindScope, Governance, Scope, SiteMetadata};
    pub use crate::builder::{OfficeBuilder, OfficeFloorBuilder, ProviderBuilder, SiteBuilder};
    pub use crate::clock::{Clock, ClockProvider, ManualClock};
    pub use crate::config::{ConfigError, FloorConfig};
    pub use crate::container::{
        AsyncContext, AsyncOperation, ContainerState, RecycleParameter, ResourceContainer,
        SourceSink,
    };
    pub use crate::escalation::{CleanupEscalation, CleanupFailure, Escalation};
    pub use crate::execute::{ExecuteContext, FlowCallback, ResolvedFlow};
    pub use crate::floor::{CloseError, Office, OfficeFloor, OpenError};
    pub use crate::function::{FunctionContext, FunctionDecl, FunctionTable};
    pub use crate::issue::{AssemblyError, AssetKind, Issue, Issues};
    pub use crate::monitor::{AssetManager, MonitorKind, TimeoutMonitor};
    pub use crate::pool::{PoolContext, PoolError, ResourcePool, ThreadCompletionListener};
    pub use crate::property::{PropertyError, PropertyList};
    pub use crate::provider::{
        DependencySlot, ExecutionGroupSlot, FlowSlot, Provider, ProviderBug, ProviderRegistry,
        SlotKey, SourceContext, SourceError, SourceMetadata,
    };
    pub use crate::resolve::{BoundProvider, FlowRef, ProviderDescriptor};
    pub use crate::resource::{
        Capabilities, DependencyRegistry, ManagedResource, ObjectRef, ObjectType, ResourceContext,
    };
    pub use crate::team::{PassiveTeam, Team, TeamError, WorkerTeam};
    pub use crate::types::{AnyArgument, ArgType, Argument};
    pub use crate::unit::{UnitOfWork, UnitReport};
}
