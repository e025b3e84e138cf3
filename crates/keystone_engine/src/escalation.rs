//! Runtime escalations delivered to units of work.

use core::time::Duration;

/// Failure raised while a resource is sourced, used or recycled, or while a
/// function runs.
///
/// Escalations are never retried by the engine. They are handed to the unit
/// of work driving the binding site, which decides what to do next.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Escalation {
    /// A timeout monitor fired.
    #[error("'{bound_name}' timed out after {timeout:?}")]
    Timeout {
        /// Bound name of the site that timed out.
        bound_name: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The provider reported it could not supply the resource.
    #[error("failed to source '{bound_name}': {message}")]
    SourcingFailed {
        /// Bound name of the site being sourced.
        bound_name: String,
        /// Provider supplied reason.
        message: String,
    },

    /// An asynchronous operation on a resource failed.
    #[error("asynchronous operation on '{bound_name}' failed: {message}")]
    AsyncOperationFailed {
        /// Bound name of the site.
        bound_name: String,
        /// Resource supplied reason.
        message: String,
    },

    /// A function of the office failed.
    #[error("function '{function}' failed: {message}")]
    FunctionFailed {
        /// Function name.
        function: String,
        /// Failure description.
        message: String,
    },

    /// A function was handed an argument of the wrong type.
    #[error("function '{function}' expects an argument of type {expected}")]
    ArgumentMismatch {
        /// Function name.
        function: String,
        /// Declared parameter type.
        expected: &'static str,
    },

    /// `invoke_flow` was called with a slot the provider never declared.
    #[error("provider '{provider}' has no flow slot {slot}")]
    UnknownFlow {
        /// Provider name.
        provider: String,
        /// Requested slot.
        slot: usize,
    },

    /// No binding site with the given bound name is reachable from the unit.
    #[error("no resource bound as '{0}' is reachable from this unit of work")]
    UnknownBinding(String),

    /// The resource cannot be used in its current lifecycle state.
    #[error("'{bound_name}' is unavailable: {reason}")]
    Unavailable {
        /// Bound name of the site.
        bound_name: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// Cleaning up the resources of a unit of work failed.
    #[error(transparent)]
    Cleanup(#[from] CleanupEscalation),
}

impl Escalation {
    /// Convenience for function handlers reporting a failure.
    #[must_use]
    pub fn failed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Escalation::FunctionFailed {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for [`Escalation::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Escalation::Timeout { .. })
    }
}

/// One resource that failed to recycle.
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    /// Type name of the managed object.
    pub resource_type: &'static str,
    /// Bound name of the binding site.
    pub bound_name: String,
    /// What went wrong.
    pub error: Escalation,
}

/// Every recycling failure of a single unit of work.
///
/// Recycling carries on past a failing resource, so this always lists all
/// failures, in recycling order.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cleanup of {} resource(s) failed", .failures.len())]
pub struct CleanupEscalation {
    failures: Vec<CleanupFailure>,
}

impl CleanupEscalation {
    /// Wraps the collected failures.
    #[must_use]
    pub fn new(failures: Vec<CleanupFailure>) -> Self {
        Self { failures }
    }

    /// The individual failures.
    #[must_use]
    pub fn failures(&self) -> &[CleanupFailure] {
        &self.failures
    }

    /// Returns `true` if the named site is among the failures.
    #[must_use]
    pub fn involves(&self, bound_name: &str) -> bool {
        self.failures.iter().any(|f| f.bound_name == bound_name)
    }
}
