//! Core providers for Keystone offices.
//!
//! - [`SingletonProvider`] - hands out clones of one value
//! - [`FactoryProvider`] - constructs an object per sourcing from properties
//! - [`InboundProvider`] - input provider turning pushed events into flows
//! - [`pool::BoundedPool`] - bounded idle-object pool with a trimming listener
//! - [`logging`] - `tracing` subscriber installation

pub mod factory;
pub mod inbound;
pub mod logging;
pub mod pool;
pub mod singleton;

pub use factory::FactoryProvider;
pub use inbound::{InboundError, InboundHandle, InboundProvider, InboundRequest};
pub use logging::{LoggingConfig, LoggingError, LoggingFormat};
pub use pool::{BoundedPool, PoolStats, PoolTrimmer};
pub use singleton::SingletonProvider;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::factory::FactoryProvider;
    pub use crate::inbound::{InboundError, InboundHandle, InboundProvider, InboundRequest};
    pub use crate::logging::{LoggingConfig, LoggingFormat};
    pub use crate::pool::{BoundedPool, PoolTrimmer};
    pub use crate::singleton::SingletonProvider;
}
