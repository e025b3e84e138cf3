//! Metadata a provider declares during initialisation.

use crate::resource::{ManagedResource, ObjectType};
use crate::types::ArgType;
use core::any::Any;

/// Enumerated key of a flow slot.
///
/// A keyed slot is addressed by its ordinal instead of its position in the
/// declaration list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    ordinal: usize,
    name: String,
}

impl SlotKey {
    /// Creates a key.
    #[must_use]
    pub fn new(ordinal: usize, name: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
        }
    }

    /// Ordinal used as the slot index.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Key name, usable when linking the flow.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A continuation point the provider may invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSlot {
    label: String,
    argument: Option<ArgType>,
    key: Option<SlotKey>,
}

impl FlowSlot {
    /// Creates a slot passing no argument.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            argument: None,
            key: None,
        }
    }

    /// Declares the argument type passed to the flow.
    #[must_use]
    pub fn with_argument<A: Any + Send + Sync>(mut self) -> Self {
        self.argument = Some(ArgType::of::<A>());
        self
    }

    /// Declares the argument type from a token.
    #[must_use]
    pub fn with_argument_type(mut self, argument: ArgType) -> Self {
        self.argument = Some(argument);
        self
    }

    /// Addresses the slot by `key` instead of by position.
    #[must_use]
    pub fn with_key(mut self, key: SlotKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Human readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Argument type handed to the flow.
    #[must_use]
    pub fn argument(&self) -> Option<ArgType> {
        self.argument
    }

    /// Enumerated key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&SlotKey> {
        self.key.as_ref()
    }

    /// Slot index: the key ordinal, or `position` for unkeyed slots.
    #[must_use]
    pub fn index(&self, position: usize) -> usize {
        self.key.as_ref().map_or(position, SlotKey::ordinal)
    }
}

/// A sibling resource the provider's objects need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySlot {
    ty: ArgType,
    qualifier: Option<String>,
}

impl DependencySlot {
    /// Dependency on a resource of type `T`.
    #[must_use]
    pub fn of<T: ManagedResource>() -> Self {
        Self {
            ty: ArgType::of::<T>(),
            qualifier: None,
        }
    }

    /// Adds a qualifier distinguishing dependencies of the same type.
    #[must_use]
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Required resource type.
    #[must_use]
    pub fn dependency_type(&self) -> ArgType {
        self.ty
    }

    /// Qualifier, if any.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

/// A named set of worker threads the provider needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionGroupSlot {
    label: String,
}

impl ExecutionGroupSlot {
    /// Creates a slot.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Human readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// What [`Provider::init`](super::Provider::init) returns.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    object_type: ObjectType,
    dependencies: Vec<DependencySlot>,
    flows: Vec<FlowSlot>,
    execution_groups: Vec<ExecutionGroupSlot>,
}

impl SourceMetadata {
    /// Metadata for a provider supplying objects of type `T`.
    #[must_use]
    pub fn for_object<T: ManagedResource>() -> Self {
        Self {
            object_type: ObjectType::of::<T>(),
            dependencies: Vec::new(),
            flows: Vec::new(),
            execution_groups: Vec::new(),
        }
    }

    /// Appends a flow slot.
    #[must_use]
    pub fn with_flow(mut self, flow: FlowSlot) -> Self {
        self.flows.push(flow);
        self
    }

    /// Appends a dependency slot.
    #[must_use]
    pub fn with_dependency(mut self, dependency: DependencySlot) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Appends an execution group slot.
    #[must_use]
    pub fn with_execution_group(mut self, label: impl Into<String>) -> Self {
        self.execution_groups.push(ExecutionGroupSlot::new(label));
        self
    }

    /// Supplied object type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Declared dependency slots.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencySlot] {
        &self.dependencies
    }

    /// Declared flow slots.
    #[must_use]
    pub fn flows(&self) -> &[FlowSlot] {
        &self.flows
    }

    /// Declared execution group slots.
    #[must_use]
    pub fn execution_groups(&self) -> &[ExecutionGroupSlot] {
        &self.execution_groups
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        ObjectType,
        Vec<DependencySlot>,
        Vec<FlowSlot>,
        Vec<ExecutionGroupSlot>,
    ) {
        (
            self.object_type,
            self.dependencies,
            self.flows,
            self.execution_groups,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Request;
    impl ManagedResource for Request {}

    #[test]
    fn keyed_slots_use_their_ordinal() {
        let plain = FlowSlot::new("handle");
        let keyed = FlowSlot::new("error").with_key(SlotKey::new(7, "ERROR"));

        assert_eq!(plain.index(2), 2);
        assert_eq!(keyed.index(2), 7);
        assert_eq!(keyed.key().map(SlotKey::name), Some("ERROR"));
    }

    #[test]
    fn metadata_accumulates_slots_in_order() {
        let metadata = SourceMetadata::for_object::<Request>()
            .with_flow(FlowSlot::new("a").with_argument::<String>())
            .with_flow(FlowSlot::new("b"))
            .with_execution_group("io")
            .with_dependency(DependencySlot::of::<Request>().qualified("upstream"));

        let labels: Vec<_> = metadata.flows().iter().map(FlowSlot::label).collect();
        assert_eq!(labels, ["a", "b"]);
        assert_eq!(
            metadata.flows()[0].argument(),
            Some(ArgType::of::<String>())
        );
        assert_eq!(metadata.execution_groups()[0].label(), "io");
        assert_eq!(metadata.dependencies()[0].qualifier(), Some("upstream"));
        assert_eq!(
            metadata.object_type().arg_type(),
            ArgType::of::<Request>()
        );
    }
}
