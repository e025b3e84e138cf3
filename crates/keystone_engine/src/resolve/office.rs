//! Phase two: binding a provider to its managing office.
//!
//! Runs once the office's function table is frozen. Resolves the recycle
//! and startup functions, the execution groups and the flow slots, and
//! produces the provider's [`ExecuteContext`].

use super::lifecycle::{self, ResolvedStartup};
use super::source::ProviderDescriptor;
use super::team::resolve_teams;
use crate::execute::{ExecuteContext, ResolvedFlow};
use crate::function::{FunctionDecl, FunctionTable};
use crate::issue::{AssetKind, Issues};
use crate::provider::StartupDecl;
use crate::team::Team;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Addresses a flow slot when linking it to a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowRef {
    /// Slot index: the key ordinal for keyed slots, the position otherwise.
    Index(usize),
    /// Name of the slot's key.
    Key(String),
}

impl From<usize> for FlowRef {
    fn from(index: usize) -> Self {
        FlowRef::Index(index)
    }
}

impl From<&str> for FlowRef {
    fn from(key: &str) -> Self {
        FlowRef::Key(key.to_string())
    }
}

impl core::fmt::Display for FlowRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlowRef::Index(index) => write!(f, "{index}"),
            FlowRef::Key(key) => write!(f, "'{key}'"),
        }
    }
}

/// Deferred second phase of one provider.
pub(crate) struct OfficeBinder {
    pub(crate) descriptor: Arc<ProviderDescriptor>,
    pub(crate) startups: Vec<StartupDecl>,
    pub(crate) flow_links: Vec<(FlowRef, String)>,
    pub(crate) team_links: Vec<(usize, String)>,
    pub(crate) default_team: Option<String>,
}

/// A provider bound to its managing office.
pub struct BoundProvider {
    descriptor: Arc<ProviderDescriptor>,
    execute: Arc<ExecuteContext>,
    recycle: Option<Arc<FunctionDecl>>,
    startups: Vec<ResolvedStartup>,
}

impl core::fmt::Debug for BoundProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundProvider")
            .field("provider", &self.descriptor.name())
            .field("office", &self.descriptor.office())
            .field("flows", &self.execute.flow_count())
            .field("startups", &self.startups.len())
            .finish_non_exhaustive()
    }
}

impl BoundProvider {
    /// Frozen provider metadata.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<ProviderDescriptor> {
        &self.descriptor
    }

    /// Runtime invocation entry point.
    #[must_use]
    pub fn execute(&self) -> &Arc<ExecuteContext> {
        &self.execute
    }

    /// Resolved recycle function.
    #[must_use]
    pub fn recycle(&self) -> Option<&Arc<FunctionDecl>> {
        self.recycle.as_ref()
    }

    /// Resolved startup functions in declaration order.
    #[must_use]
    pub fn startups(&self) -> &[ResolvedStartup] {
        &self.startups
    }
}

impl OfficeBinder {
    /// Runs phase two. Every problem is reported before returning `None`.
    pub(crate) fn bind(
        self,
        table: &FunctionTable,
        teams: &IndexMap<String, Arc<dyn Team>>,
        issues: &mut Issues,
    ) -> Option<BoundProvider> {
        let descriptor = self.descriptor;
        let name = descriptor.name();

        // A bad recycle function aborts straight away.
        let recycle =
            lifecycle::resolve_recycle(name, descriptor.recycle_function(), table, issues).ok()?;

        let startups = lifecycle::resolve_startups(name, self.startups, table, issues);
        let dependencies_ok = lifecycle::resolve_function_dependencies(
            name,
            descriptor.function_dependencies(),
            table,
            issues,
        );
        let resolved_teams = resolve_teams(
            name,
            descriptor.execution_groups(),
            &self.team_links,
            self.default_team.as_deref(),
            teams,
            issues,
        );
        let flows = resolve_flows(&descriptor, &self.flow_links, table, issues);

        let (Some(startups), true, Some(resolved_teams), Some(flows)) =
            (startups, dependencies_ok, resolved_teams, flows)
        else {
            return None;
        };

        tracing::debug!(
            provider = %name,
            office = %descriptor.office(),
            flows = flows.len(),
            teams = resolved_teams.len(),
            "provider bound to office"
        );

        let input_site = descriptor
            .is_input()
            .then(|| crate::binding::input_bound_name(name));
        let execute = Arc::new(ExecuteContext::new(
            name.to_string(),
            flows,
            resolved_teams,
            input_site,
        ));
        Some(BoundProvider {
            descriptor,
            execute,
            recycle,
            startups,
        })
    }
}

/// Maps every declared flow slot to exactly one function.
pub(crate) fn resolve_flows(
    descriptor: &ProviderDescriptor,
    links: &[(FlowRef, String)],
    table: &FunctionTable,
    issues: &mut Issues,
) -> Option<Vec<ResolvedFlow>> {
    let before = issues.len();
    let name = descriptor.name();

    let mut declared = BTreeMap::new();
    for (position, slot) in descriptor.flows().iter().enumerate() {
        let index = slot.index(position);
        if declared.insert(index, slot).is_some() {
            issues.report(
                AssetKind::Provider,
                name,
                format!("flow slot {index} is declared more than once"),
            );
        }
    }

    let mut linked: BTreeMap<usize, &str> = BTreeMap::new();
    for (slot, function) in links {
        let index = match slot {
            FlowRef::Index(index) => *index,
            FlowRef::Key(key) => {
                let found = declared
                    .iter()
                    .find(|(_, s)| s.key().is_some_and(|k| k.name() == key))
                    .map(|(index, _)| *index);
                match found {
                    Some(index) => index,
                    None => {
                        issues.report(
                            AssetKind::Provider,
                            name,
                            format!("no flow slot has key {slot}"),
                        );
                        continue;
                    }
                }
            }
        };
        if linked.insert(index, function).is_some() {
            issues.report(
                AssetKind::Provider,
                name,
                format!("flow slot {index} is linked more than once"),
            );
        }
    }

    for index in declared.keys() {
        if !linked.contains_key(index) {
            issues.report(
                AssetKind::Provider,
                name,
                format!("no flow configured for slot {index}"),
            );
        }
    }
    for index in linked.keys() {
        if !declared.contains_key(index) {
            issues.report(
                AssetKind::Provider,
                name,
                format!("extra flow configured for slot {index}"),
            );
        }
    }

    let mut flows = Vec::with_capacity(declared.len());
    for (index, slot) in &declared {
        let Some(target) = linked.get(index) else {
            continue;
        };
        match table.get(target) {
            // The provider invokes the flow, so its declared argument type wins.
            Some(function) => flows.push(ResolvedFlow::new(
                *index,
                slot.label(),
                Arc::new(function.with_parameter(slot.argument())),
            )),
            None => issues.report(
                AssetKind::Provider,
                name,
                format!("unknown function '{target}' for flow slot {index}"),
            ),
        }
    }

    (issues.len() == before).then_some(flows)
}
