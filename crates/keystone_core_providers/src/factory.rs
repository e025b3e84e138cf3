//! Providers constructing a fresh object per sourcing.

use keystone_engine::container::SourceSink;
use keystone_engine::property::PropertyList;
use keystone_engine::provider::{
    DependencySlot, Provider, ProviderRegistry, SourceContext, SourceError, SourceMetadata,
};
use keystone_engine::resource::ManagedResource;
use std::sync::Arc;

type Constructor<T> = Arc<dyn Fn(&PropertyList) -> Result<T, SourceError> + Send + Sync>;

/// Constructs a new object from the provider's properties every time a
/// binding site is sourced.
///
/// The constructor runs once during `init` so that missing or malformed
/// properties are reported at assembly rather than at first use.
pub struct FactoryProvider<T> {
    constructor: Constructor<T>,
    dependencies: Vec<DependencySlot>,
    properties: PropertyList,
}

impl<T> core::fmt::Debug for FactoryProvider<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FactoryProvider")
            .field("object", &core::any::type_name::<T>())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl<T: ManagedResource> FactoryProvider<T> {
    /// Creates the provider.
    pub fn new(
        constructor: impl Fn(&PropertyList) -> Result<T, SourceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            constructor: Arc::new(constructor),
            dependencies: Vec::new(),
            properties: PropertyList::new(),
        }
    }

    /// Declares a dependency slot for coordinating objects.
    #[must_use]
    pub fn with_dependency(mut self, dependency: DependencySlot) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Registers the provider as `class` so configurations can name it.
    pub fn register(
        registry: &mut ProviderRegistry,
        class: impl Into<String>,
        constructor: impl Fn(&PropertyList) -> Result<T, SourceError> + Send + Sync + 'static,
    ) {
        let constructor: Constructor<T> = Arc::new(constructor);
        registry.register(class, move |_| {
            let provider = FactoryProvider {
                constructor: Arc::clone(&constructor),
                dependencies: Vec::new(),
                properties: PropertyList::new(),
            };
            Ok(Box::new(provider) as Box<dyn Provider>)
        });
    }
}

impl<T: ManagedResource> Provider for FactoryProvider<T> {
    fn init(&mut self, context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
        (self.constructor)(context.properties())?;
        self.properties = context.properties().clone();

        let metadata = self
            .dependencies
            .iter()
            .cloned()
            .fold(SourceMetadata::for_object::<T>(), SourceMetadata::with_dependency);
        Ok(metadata)
    }

    fn source(&self, sink: SourceSink) {
        match (self.constructor)(&self.properties) {
            Ok(object) => sink.ready(object),
            Err(error) => sink.fail(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_engine::prelude::*;

    #[derive(Debug)]
    struct Endpoint {
        port: u16,
    }
    impl ManagedResource for Endpoint {}

    fn endpoint(properties: &PropertyList) -> Result<Endpoint, SourceError> {
        let port = properties.parse::<u16>("port")?.unwrap_or(80);
        Ok(Endpoint { port })
    }

    #[test]
    fn malformed_property_is_an_assembly_issue() {
        let mut builder = OfficeFloorBuilder::new();
        builder
            .add_provider("endpoint", FactoryProvider::new(endpoint))
            .office("app")
            .property("port", "eighty");
        builder.office("app").bind(BindScope::Process, "endpoint");

        let error = builder.build().unwrap_err();
        assert!(error.mentions("failed to initialise"));
    }

    #[test]
    fn constructs_from_properties() {
        let mut builder = OfficeFloorBuilder::new();
        builder
            .add_provider("endpoint", FactoryProvider::new(endpoint))
            .office("app")
            .property("port", "8080");
        builder.office("app").bind(BindScope::Process, "endpoint").bound_name("endpoint");

        let floor = builder.build().unwrap();
        let office = floor.office("app").unwrap();
        let unit = office.begin_process();
        let container = unit.acquire_blocking("endpoint", None).unwrap();
        assert_eq!(container.object::<Endpoint>().unwrap().port, 8080);
        assert!(unit.complete().is_success());
    }

    #[test]
    fn registered_class_is_instantiated_by_name() {
        let mut builder = OfficeFloorBuilder::new();
        FactoryProvider::register(builder.registry_mut(), "endpoint", endpoint);
        builder.add_provider_class("web", "endpoint").office("app");
        builder.office("app").bind(BindScope::Global, "web").bound_name("web");

        let floor = builder.build().unwrap();
        assert!(floor.descriptor("web").is_some());
    }
}
