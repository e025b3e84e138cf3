//! Declarative floor configuration.
//!
//! A [`FloorConfig`] describes teams, providers (by registered class) and
//! binding sites. Functions are always added in code. Applying a
//! configuration only feeds the builder; every check happens at assembly.
//!
//! ```
//! use keystone_engine::config::FloorConfig;
//!
//! let config = FloorConfig::from_json(r#"{
//!     "teams": [{ "name": "workers", "size": 2 }],
//!     "providers": [{
//!         "name": "clock",
//!         "class": "system-clock",
//!         "office": "app",
//!         "timeout_millis": 500
//!     }],
//!     "offices": [{
//!         "name": "app",
//!         "sites": [{ "provider": "clock", "scope": "global" }]
//!     }]
//! }"#).unwrap();
//! assert_eq!(config.providers[0].class, "system-clock");
//! ```

use crate::binding::{BindScope, Scope};
use crate::builder::OfficeFloorBuilder;
use crate::resolve::FlowRef;
use crate::team::{PassiveTeam, WorkerTeam};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Failure to read or apply a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed JSON or unknown fields.
    #[error("invalid floor configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A function-scoped site without its enclosing function.
    #[error("site of provider '{provider}' in office '{office}' has function scope but no function")]
    FunctionScopeWithoutFunction {
        /// Office of the site.
        office: String,
        /// Provider of the site.
        provider: String,
    },
}

/// Root of the declarative configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloorConfig {
    /// Teams.
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
    /// Providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Offices and their sites.
    #[serde(default)]
    pub offices: Vec<OfficeConfig>,
}

/// A team. Size zero runs jobs on the assigning thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamConfig {
    /// Team name.
    pub name: String,
    /// Number of worker threads.
    #[serde(default)]
    pub size: usize,
}

/// A provider instantiated from a registered class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider name.
    pub name: String,
    /// Registered class.
    pub class: String,
    /// Managing office.
    #[serde(default)]
    pub office: Option<String>,
    /// Properties passed to `init`.
    #[serde(default)]
    pub properties: IndexMap<String, String>,
    /// Timeout in milliseconds.
    #[serde(default)]
    pub timeout_millis: i64,
    /// Whether the provider gets an input site.
    #[serde(default)]
    pub input: bool,
    /// Flow links.
    #[serde(default)]
    pub flows: Vec<FlowLinkConfig>,
    /// Execution group links.
    #[serde(default)]
    pub teams: Vec<TeamLinkConfig>,
    /// Team for every unlinked execution group.
    #[serde(default)]
    pub default_team: Option<String>,
}

/// Links a flow slot to a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowLinkConfig {
    /// Slot index or key.
    pub slot: FlowRef,
    /// Target function in the managing office.
    pub function: String,
}

/// Links an execution group to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamLinkConfig {
    /// Execution group index.
    pub group: usize,
    /// Team name.
    pub team: String,
}

/// An office and its binding sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfficeConfig {
    /// Office name.
    pub name: String,
    /// Binding sites.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// A binding site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Provider bound at the site.
    pub provider: String,
    /// Scope of the bound objects.
    pub scope: Scope,
    /// Enclosing function, required for function scope.
    #[serde(default)]
    pub function: Option<String>,
    /// Bound name override.
    #[serde(default)]
    pub bound_name: Option<String>,
    /// Dependency links.
    #[serde(default)]
    pub dependencies: Vec<DependencyLinkConfig>,
    /// Governance names.
    #[serde(default)]
    pub governance: Vec<String>,
}

/// Maps a dependency slot to a bound name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyLinkConfig {
    /// Dependency slot.
    pub slot: usize,
    /// Bound name of the site supplying the dependency.
    pub bound_name: String,
}

impl FloorConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Feeds the configuration into `builder`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FunctionScopeWithoutFunction`] for a function-scoped
    /// site lacking its function. Nothing is applied in that case.
    pub fn apply(&self, builder: &mut OfficeFloorBuilder) -> Result<(), ConfigError> {
        for office in &self.offices {
            for site in &office.sites {
                if site.scope == Scope::Function && site.function.is_none() {
                    return Err(ConfigError::FunctionScopeWithoutFunction {
                        office: office.name.clone(),
                        provider: site.provider.clone(),
                    });
                }
            }
        }

        for team in &self.teams {
            match team.size {
                0 => builder.add_team(&team.name, PassiveTeam),
                size => builder.add_team(&team.name, WorkerTeam::new(&team.name, size)),
            };
        }

        for config in &self.providers {
            let provider = builder.add_provider_class(&config.name, &config.class);
            if let Some(office) = &config.office {
                provider.office(office);
            }
            for (name, value) in &config.properties {
                provider.property(name, value);
            }
            provider.timeout_millis(config.timeout_millis);
            if config.input {
                provider.input();
            }
            for link in &config.flows {
                provider.link_flow(link.slot.clone(), &link.function);
            }
            for link in &config.teams {
                provider.link_team(link.group, &link.team);
            }
            if let Some(team) = &config.default_team {
                provider.default_team(team);
            }
        }

        for config in &self.offices {
            let office = builder.office(&config.name);
            for site in &config.sites {
                let scope = match (site.scope, &site.function) {
                    (Scope::Function, Some(function)) => BindScope::Function(function.clone()),
                    (Scope::Function, None) | (Scope::Thread, _) => BindScope::Thread,
                    (Scope::Process, _) => BindScope::Process,
                    (Scope::Global, _) => BindScope::Global,
                };
                let binding = office.bind(scope, &site.provider);
                if let Some(name) = &site.bound_name {
                    binding.bound_name(name);
                }
                for link in &site.dependencies {
                    binding.depends_on(link.slot, &link.bound_name);
                }
                for governance in &site.governance {
                    binding.govern(governance);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let error = FloorConfig::from_json(r#"{ "offices": [], "extra": 1 }"#).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn flow_slots_accept_index_or_key() {
        let config = FloorConfig::from_json(
            r#"{ "providers": [{
                "name": "p", "class": "c",
                "flows": [{ "slot": 0, "function": "a" }, { "slot": "retry", "function": "b" }]
            }] }"#,
        )
        .unwrap();
        let flows = &config.providers[0].flows;
        assert_eq!(flows[0].slot, FlowRef::Index(0));
        assert_eq!(flows[1].slot, FlowRef::Key("retry".into()));
    }

    #[test]
    fn function_scope_requires_function() {
        let config = FloorConfig::from_json(
            r#"{ "offices": [{ "name": "app", "sites": [{ "provider": "p", "scope": "function" }] }] }"#,
        )
        .unwrap();
        let mut builder = OfficeFloorBuilder::new();
        let error = config.apply(&mut builder).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::FunctionScopeWithoutFunction { ref office, .. } if office == "app"
        ));
    }
}
