//! Providers handing out copies of a configured value.

use keystone_engine::container::SourceSink;
use keystone_engine::provider::{Provider, SourceContext, SourceError, SourceMetadata};
use keystone_engine::resource::ManagedResource;

/// Supplies a clone of one value to every binding site.
///
/// Wrap shared state in an `Arc` inside `T` to have every site observe the
/// same instance.
///
/// ```
/// use keystone_core_providers::SingletonProvider;
/// use keystone_engine::prelude::*;
///
/// #[derive(Clone)]
/// struct Greeting(&'static str);
/// impl ManagedResource for Greeting {}
///
/// let mut builder = OfficeFloorBuilder::new();
/// builder.add_provider("greeting", SingletonProvider::new(Greeting("hello"))).office("app");
/// builder.office("app").bind(BindScope::Global, "greeting");
/// assert!(builder.build().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SingletonProvider<T> {
    value: T,
}

impl<T: ManagedResource + Clone> SingletonProvider<T> {
    /// Creates the provider.
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// The shared value.
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: ManagedResource + Clone> Provider for SingletonProvider<T> {
    fn init(&mut self, _context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
        Ok(SourceMetadata::for_object::<T>())
    }

    fn source(&self, sink: SourceSink) {
        sink.ready(self.value.clone());
    }
}
