//! Two-phase binding and lifecycle coordination of managed resources.
//!
//! - [`keystone_engine`] - providers, offices, binding sites and their lifecycle
//! - [`keystone_core_providers`] - ready-made providers, pooling and logging

pub use keystone_core_providers;
pub use keystone_engine;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use keystone_core_providers::prelude::*;
    pub use keystone_engine::prelude::*;
}
