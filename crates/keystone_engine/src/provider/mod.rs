//! The provider contract.
//!
//! A provider (managed object source) supplies [`ManagedResource`] objects to
//! binding sites. Its lifecycle on an office floor is:
//!
//! 1. [`init`](Provider::init): called once during assembly, before any office
//!    function table exists. Declares metadata through the [`SourceContext`].
//! 2. [`start`](Provider::start): called once when the floor opens, with the
//!    [`ExecuteContext`] through which the provider may invoke flows.
//! 3. [`source`](Provider::source): called on any thread whenever a binding
//!    site needs a new object and the pool (if any) had none.
//! 4. [`stop`](Provider::stop): called once when the floor closes.
//!
//! [`ManagedResource`]: crate::resource::ManagedResource

mod context;
mod metadata;
mod registry;

pub use context::{ProviderBug, SourceContext, StartupDecl};
pub use metadata::{DependencySlot, ExecutionGroupSlot, FlowSlot, SlotKey, SourceMetadata};
pub use registry::{InstantiateError, ProviderFactory, ProviderRegistry};

use crate::container::SourceSink;
use crate::execute::ExecuteContext;
use crate::property::PropertyError;
use std::sync::Arc;

/// Failure raised by a provider.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A property is missing or malformed.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// The provider violated its contract.
    #[error(transparent)]
    Bug(#[from] ProviderBug),

    /// Free-form failure.
    #[error("{0}")]
    Message(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    /// Creates a [`SourceError::Message`].
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        SourceError::Message(message.into())
    }
}

/// A managed object source.
pub trait Provider: Send + Sync + 'static {
    /// One-time initialisation.
    ///
    /// # Errors
    ///
    /// Any error is collected as a configuration issue and the provider is
    /// left out of the floor. [`SourceError::Bug`] fails assembly outright.
    fn init(&mut self, context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError>;

    /// Called once the floor is open. Flows may be invoked from here on.
    ///
    /// # Errors
    ///
    /// Any error aborts opening the floor.
    fn start(&self, _execute: Arc<ExecuteContext>) -> Result<(), SourceError> {
        Ok(())
    }

    /// Supplies an object, now or later and from any thread, through `sink`.
    fn source(&self, sink: SourceSink);

    /// Called once when the floor closes.
    fn stop(&self) {}
}
