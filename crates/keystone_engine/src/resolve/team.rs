//! Execution group resolution: declared groups to concrete teams.

use crate::issue::{AssetKind, Issues};
use crate::provider::ExecutionGroupSlot;
use crate::team::Team;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps every declared execution group of `provider` to a team.
///
/// A default team covers every group that is not linked explicitly. Without
/// one, each group needs exactly one link. Extra, duplicate and missing links
/// and unknown team names are all reported before giving up.
pub(crate) fn resolve_teams(
    provider: &str,
    groups: &[ExecutionGroupSlot],
    links: &[(usize, String)],
    default_team: Option<&str>,
    teams: &IndexMap<String, Arc<dyn Team>>,
    issues: &mut Issues,
) -> Option<Vec<Arc<dyn Team>>> {
    let before = issues.len();

    let lookup = |name: &str, issues: &mut Issues| -> Option<Arc<dyn Team>> {
        let team = teams.get(name).cloned();
        if team.is_none() {
            issues.report(AssetKind::Team, name, format!("unknown team for provider '{provider}'"));
        }
        team
    };

    let default = default_team.and_then(|name| lookup(name, issues));

    let mut linked: BTreeMap<usize, Arc<dyn Team>> = BTreeMap::new();
    for (group, team) in links {
        if *group >= groups.len() {
            issues.report(
                AssetKind::Provider,
                provider,
                format!("extra team configured for execution group {group}"),
            );
            continue;
        }
        if linked.contains_key(group) {
            issues.report(
                AssetKind::Provider,
                provider,
                format!("execution group {group} is linked more than once"),
            );
            continue;
        }
        if let Some(team) = lookup(team, issues) {
            linked.insert(*group, team);
        }
    }

    let mut resolved = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        match linked.remove(&index).or_else(|| default.clone()) {
            Some(team) => resolved.push(team),
            None if default_team.is_some() => {}
            None => issues.report(
                AssetKind::Provider,
                provider,
                format!(
                    "no team configured for execution group {index} ({})",
                    group.label()
                ),
            ),
        }
    }

    (issues.len() == before).then_some(resolved)
}
