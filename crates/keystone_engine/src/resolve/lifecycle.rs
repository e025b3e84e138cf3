//! Resolution of recycle, startup and dependent functions against an office.

use crate::container::RecycleParameter;
use crate::function::{FunctionDecl, FunctionTable};
use crate::issue::{AssetKind, Issue, Issues};
use crate::provider::StartupDecl;
use crate::types::{ArgType, Argument};
use parking_lot::Mutex;
use std::sync::Arc;

/// A startup function ready to be invoked when the floor opens.
pub struct ResolvedStartup {
    function: Arc<FunctionDecl>,
    argument: Mutex<Option<Argument>>,
}

impl core::fmt::Debug for ResolvedStartup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResolvedStartup")
            .field("function", &self.function.name())
            .finish_non_exhaustive()
    }
}

impl ResolvedStartup {
    /// The function to invoke.
    #[must_use]
    pub fn function(&self) -> &Arc<FunctionDecl> {
        &self.function
    }

    /// Hands out the argument. Only the first call returns it.
    pub(crate) fn take_argument(&self) -> Option<Argument> {
        self.argument.lock().take()
    }
}

/// Resolves the recycle function of `provider`.
///
/// `Ok(None)` when none is declared. `Err(())` once an issue was reported.
pub(crate) fn resolve_recycle(
    provider: &str,
    recycle: Option<&str>,
    table: &FunctionTable,
    issues: &mut Issues,
) -> Result<Option<Arc<FunctionDecl>>, ()> {
    let Some(name) = recycle else {
        return Ok(None);
    };
    let Some(function) = table.get(name) else {
        issues.report(
            AssetKind::Provider,
            provider,
            format!("unknown recycle function '{name}'"),
        );
        return Err(());
    };
    if let Some(parameter) = function.parameter()
        && !parameter.accepts(&ArgType::of::<RecycleParameter>())
    {
        issues.report(
            AssetKind::Provider,
            provider,
            format!(
                "recycle function '{name}' accepts {parameter} instead of the recycle parameter"
            ),
        );
        return Err(());
    }
    Ok(Some(Arc::clone(function)))
}

/// Resolves every startup invocation, reporting all failures.
pub(crate) fn resolve_startups(
    provider: &str,
    startups: Vec<StartupDecl>,
    table: &FunctionTable,
    issues: &mut Issues,
) -> Option<Vec<ResolvedStartup>> {
    let before = issues.len();
    let mut resolved = Vec::with_capacity(startups.len());
    for startup in startups {
        let Some(function) = table.get(&startup.function) else {
            issues.report(
                AssetKind::Provider,
                provider,
                format!("unknown startup function '{}'", startup.function),
            );
            continue;
        };
        match (function.parameter(), startup.argument_type) {
            (Some(parameter), Some(supplied)) if !parameter.accepts(&supplied) => {
                issues.push(Issue::new(
                    AssetKind::Function,
                    function.name(),
                    format!("startup argument {supplied} is not assignable to {parameter}"),
                ));
                continue;
            }
            (None, Some(supplied)) => {
                issues.push(Issue::new(
                    AssetKind::Function,
                    function.name(),
                    format!("takes no argument but startup supplies {supplied}"),
                ));
                continue;
            }
            _ => {}
        }
        resolved.push(ResolvedStartup {
            function: Arc::clone(function),
            argument: Mutex::new(startup.argument),
        });
    }
    (issues.len() == before).then_some(resolved)
}

/// Checks that both ends of every declared function dependency exist.
pub(crate) fn resolve_function_dependencies(
    provider: &str,
    dependencies: &[(String, String)],
    table: &FunctionTable,
    issues: &mut Issues,
) -> bool {
    let before = issues.len();
    for (function, depends_on) in dependencies {
        for name in [function, depends_on] {
            if !table.contains(name) {
                issues.report(
                    AssetKind::Provider,
                    provider,
                    format!("function dependency '{function}' -> '{depends_on}' names unknown function '{name}'"),
                );
            }
        }
    }
    issues.len() == before
}
