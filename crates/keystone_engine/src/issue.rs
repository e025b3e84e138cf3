//! Configuration issues collected while assembling an office floor.
//!
//! Assembly never stops at the first problem. Each resolver pushes an
//! [`Issue`] into a shared [`Issues`] collector, skips the affected asset and
//! carries on, so a single [`OfficeFloorBuilder::build`] call reports every
//! misconfiguration at once.
//!
//! [`OfficeFloorBuilder::build`]: crate::builder::OfficeFloorBuilder::build

use crate::provider::ProviderBug;
use std::error::Error;
use std::sync::Arc;

/// Kind of asset an [`Issue`] is raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// A provider (managed object source).
    Provider,
    /// An office (host function graph).
    Office,
    /// A team (execution group implementation).
    Team,
    /// A binding site within an office.
    BindingSite,
    /// A function within an office.
    Function,
}

impl core::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            AssetKind::Provider => "provider",
            AssetKind::Office => "office",
            AssetKind::Team => "team",
            AssetKind::BindingSite => "binding site",
            AssetKind::Function => "function",
        };
        f.write_str(label)
    }
}

/// A single configuration problem.
#[derive(Debug, Clone)]
pub struct Issue {
    kind: AssetKind,
    name: String,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl Issue {
    /// Creates an issue against the named asset.
    #[must_use]
    pub fn new(kind: AssetKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the underlying failure.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Kind of asset at fault.
    #[must_use]
    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Name of the asset at fault (may be empty for unnamed providers).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying failure, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync)> {
        self.cause.as_deref()
    }
}

impl core::fmt::Display for Issue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.name, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

/// Collector of [`Issue`]s.
#[derive(Debug, Default)]
pub struct Issues {
    issues: Vec<Issue>,
}

impl Issues {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Records an issue.
    pub fn push(&mut self, issue: Issue) {
        tracing::debug!(%issue, "assembly issue");
        self.issues.push(issue);
    }

    /// Records an issue built from its parts.
    pub fn report(&mut self, kind: AssetKind, name: &str, message: impl Into<String>) {
        self.push(Issue::new(kind, name, message));
    }

    /// Number of recorded issues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Iterates recorded issues in the order they were raised.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    /// Consumes the collector.
    #[must_use]
    pub fn into_vec(self) -> Vec<Issue> {
        self.issues
    }
}

/// Failure to assemble an office floor.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// One or more configuration issues were collected.
    #[error("office floor assembly failed with {} issue(s)", .0.len())]
    Issues(Vec<Issue>),

    /// A provider implementation violated its contract while initialising.
    #[error("provider '{provider}' is defective: {bug}")]
    ProviderBug {
        /// Name of the defective provider.
        provider: String,
        /// The contract violation.
        bug: ProviderBug,
    },
}

impl AssemblyError {
    /// Collected issues (empty for [`AssemblyError::ProviderBug`]).
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        match self {
            AssemblyError::Issues(issues) => issues,
            AssemblyError::ProviderBug { .. } => &[],
        }
    }

    /// Returns `true` if any collected issue message contains `fragment`.
    #[must_use]
    pub fn mentions(&self, fragment: &str) -> bool {
        self.issues()
            .iter()
            .any(|issue| issue.message().contains(fragment))
    }
}
