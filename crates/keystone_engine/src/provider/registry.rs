//! Explicit class registry for providers named in configuration.
//!
//! The registry is owned by the [`OfficeFloorBuilder`](crate::builder::OfficeFloorBuilder)
//! and dropped with it. There is no process-wide registry.

use super::Provider;
use crate::property::PropertyList;
use indexmap::IndexMap;

/// Builds a provider instance from its configured properties.
pub type ProviderFactory = Box<
    dyn Fn(&PropertyList) -> Result<Box<dyn Provider>, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Failure to instantiate a registered provider class.
#[derive(Debug, thiserror::Error)]
pub enum InstantiateError {
    /// No factory is registered under the class name.
    #[error("unknown provider class '{0}'")]
    UnknownClass(String),

    /// The factory failed.
    #[error("failed to instantiate provider class '{class}'")]
    Failed {
        /// Class name.
        class: String,
        /// Factory error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Provider classes by name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: IndexMap<String, ProviderFactory>,
}

impl core::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Registers a factory, replacing any previous one for `class`.
    pub fn register(
        &mut self,
        class: impl Into<String>,
        factory: impl Fn(&PropertyList) -> Result<Box<dyn Provider>, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.factories.insert(class.into(), Box::new(factory));
        self
    }

    /// Registers a class whose instances are created with [`Default`].
    pub fn register_default<P: Provider + Default>(&mut self, class: impl Into<String>) -> &mut Self {
        self.register(class, |_| Ok(Box::new(P::default()) as Box<dyn Provider>))
    }

    /// Returns `true` if `class` is registered.
    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates an instance of `class`.
    ///
    /// # Errors
    ///
    /// [`InstantiateError`] if the class is unknown or its factory fails.
    pub fn instantiate(
        &self,
        class: &str,
        properties: &PropertyList,
    ) -> Result<Box<dyn Provider>, InstantiateError> {
        let factory = self
            .factories
            .get(class)
            .ok_or_else(|| InstantiateError::UnknownClass(class.to_string()))?;
        factory(properties).map_err(|source| InstantiateError::Failed {
            class: class.to_string(),
            source,
        })
    }
}
