//! The two resolution phases.
//!
//! | Phase | Module | Needs | Produces |
//! |-------|--------|-------|----------|
//! | 1 | [`source`] | provider, properties, office names | [`ProviderDescriptor`] + deferred binder |
//! | 2 | [`office`] | frozen office function table, teams | [`BoundProvider`] with its [`ExecuteContext`](crate::execute::ExecuteContext) |
//!
//! Phase one runs for every provider before phase two runs for any. The
//! descriptor produced by phase one never changes afterwards.

pub mod lifecycle;
pub mod office;
pub mod source;
pub mod team;

pub use lifecycle::ResolvedStartup;
pub use office::{BoundProvider, FlowRef};
pub use source::{DefaultPoolFactory, ProviderDescriptor};
