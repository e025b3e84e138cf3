//! The managed object contract.
//!
//! Providers hand out objects implementing [`ManagedResource`]. What the
//! engine does with an object depends on its [`Capabilities`], which are
//! intrinsic to the object *type* (declared by the implementation through
//! [`ManagedResource::capabilities`]) and can never be configured from outside:
//!
//! | Capability | Hook | Effect |
//! |------------|------|--------|
//! | context-aware | [`bind_context`](ManagedResource::bind_context) | receives its bound name and logging span |
//! | asynchronous | [`bind_async`](ManagedResource::bind_async) | may run monitored asynchronous operations |
//! | coordinating | [`load_dependencies`](ManagedResource::load_dependencies) | receives its sibling resources |
//!
//! # Example
//!
//! ```
//! use keystone_engine::resource::{Capabilities, ManagedResource, ResourceContext};
//!
//! struct Connection {
//!     label: String,
//! }
//!
//! impl ManagedResource for Connection {
//!     fn capabilities() -> Capabilities {
//!         Capabilities::NONE.context_aware()
//!     }
//!
//!     fn bind_context(&mut self, context: ResourceContext) {
//!         self.label = context.bound_name().to_string();
//!     }
//! }
//! ```

use crate::container::{AsyncContext, ResourceContainer};
use crate::escalation::Escalation;
use crate::types::ArgType;
use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::MappedRwLockReadGuard;
use std::sync::Arc;

/// Capability flags of a managed object type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Receives a [`ResourceContext`] once sourced.
    pub context_aware: bool,
    /// Runs asynchronous operations watched by an operation monitor.
    pub asynchronous: bool,
    /// Depends on sibling resources.
    pub coordinating: bool,
}

impl Capabilities {
    /// No optional capability.
    pub const NONE: Self = Self {
        context_aware: false,
        asynchronous: false,
        coordinating: false,
    };

    /// Adds the context-aware capability.
    #[must_use]
    pub const fn context_aware(mut self) -> Self {
        self.context_aware = true;
        self
    }

    /// Adds the asynchronous capability.
    #[must_use]
    pub const fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Adds the coordinating capability.
    #[must_use]
    pub const fn coordinating(mut self) -> Self {
        self.coordinating = true;
        self
    }
}

/// An object supplied by a provider and bound into an office.
pub trait ManagedResource: DowncastSync {
    /// Capabilities of this type. Override to opt in.
    fn capabilities() -> Capabilities
    where
        Self: Sized,
    {
        Capabilities::NONE
    }

    /// Context-aware hook, called once after sourcing.
    fn bind_context(&mut self, _context: ResourceContext) {}

    /// Asynchronous hook, called once after sourcing.
    fn bind_async(&mut self, _context: AsyncContext) {}

    /// Coordinating hook, called once after sourcing with the resources bound
    /// to this object's dependency slots.
    ///
    /// # Errors
    ///
    /// Any escalation fails the sourcing of this object.
    fn load_dependencies(&mut self, _dependencies: &DependencyRegistry) -> Result<(), Escalation> {
        Ok(())
    }
}
impl_downcast!(sync ManagedResource);

/// Type and capabilities of the objects a provider supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectType {
    ty: ArgType,
    capabilities: Capabilities,
}

impl ObjectType {
    /// Captures the object type `T` and its intrinsic capabilities.
    #[must_use]
    pub fn of<T: ManagedResource>() -> Self {
        Self {
            ty: ArgType::of::<T>(),
            capabilities: T::capabilities(),
        }
    }

    /// The object type token.
    #[must_use]
    pub fn arg_type(&self) -> ArgType {
        self.ty
    }

    /// Type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.ty.type_name()
    }

    /// Intrinsic capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Handed to context-aware resources.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    bound_name: Arc<str>,
    span: tracing::Span,
}

impl ResourceContext {
    pub(crate) fn new(bound_name: Arc<str>, span: tracing::Span) -> Self {
        Self { bound_name, span }
    }

    /// The unique bound name of the binding site.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        &self.bound_name
    }

    /// Logging span of the binding site.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

/// Read guard over a ready managed object.
pub type ObjectRef<'a, T> = MappedRwLockReadGuard<'a, T>;

/// The resources bound to a coordinating object's dependency slots.
///
/// Slot `i` holds the container of the dependency mapped to declared slot `i`.
/// All dependencies are ready before
/// [`load_dependencies`](ManagedResource::load_dependencies) is called.
pub struct DependencyRegistry {
    dependencies: Vec<Arc<ResourceContainer>>,
}

impl DependencyRegistry {
    pub(crate) fn new(dependencies: Vec<Arc<ResourceContainer>>) -> Self {
        Self { dependencies }
    }

    /// Borrows the dependency in `slot` as `T`.
    ///
    /// Returns `None` if the slot does not exist, the object is not a `T`, or
    /// the dependency is no longer ready.
    #[must_use]
    pub fn get<T: ManagedResource>(&self, slot: usize) -> Option<ObjectRef<'_, T>> {
        self.dependencies.get(slot)?.object::<T>()
    }

    /// Bound name of the dependency in `slot`.
    #[must_use]
    pub fn bound_name(&self, slot: usize) -> Option<&str> {
        self.dependencies.get(slot).map(|c| c.bound_name())
    }

    /// Number of dependency slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns `true` if there are no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl ManagedResource for Plain {}

    struct Coordinator;
    impl ManagedResource for Coordinator {
        fn capabilities() -> Capabilities {
            Capabilities::NONE.coordinating().asynchronous()
        }
    }

    #[test]
    fn capabilities_follow_the_type() {
        assert_eq!(ObjectType::of::<Plain>().capabilities(), Capabilities::NONE);

        let coordinating = ObjectType::of::<Coordinator>().capabilities();
        assert!(coordinating.coordinating);
        assert!(coordinating.asynchronous);
        assert!(!coordinating.context_aware);
    }

    #[test]
    fn boxed_resources_downcast() {
        let boxed: Box<dyn ManagedResource> = Box::new(Plain);
        assert!(boxed.is::<Plain>());
        assert!(boxed.downcast_ref::<Coordinator>().is_none());
    }
}
