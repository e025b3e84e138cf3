//! Property carrier handed to providers at construct time.
//!
//! A [`PropertyList`] is an ordered, string-keyed bag. The engine never
//! interprets the values; providers read them during
//! [`Provider::init`](crate::provider::Provider::init) through the
//! [`SourceContext`](crate::provider::SourceContext).

use core::str::FromStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Errors raised while reading properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A required property was not configured.
    #[error("must specify property '{0}'")]
    Missing(String),

    /// A property value could not be parsed into the requested type.
    #[error("property '{name}' has invalid value '{value}'")]
    Invalid {
        /// Property name.
        name: String,
        /// The offending raw value.
        value: String,
    },
}

/// Ordered key/value configuration for a single provider.
///
/// # Example
///
/// ```
/// use keystone_engine::property::PropertyList;
///
/// let properties = PropertyList::new()
///     .with("url", "postgres://localhost/app")
///     .with("max.connections", "8");
///
/// assert_eq!(properties.get("url"), Some("postgres://localhost/app"));
/// assert_eq!(properties.parse::<u32>("max.connections").unwrap(), Some(8));
/// assert_eq!(properties.get_or("schema", "public"), "public");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyList {
    entries: IndexMap<String, String>,
}

impl PropertyList {
    /// Creates an empty property list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Adds a property, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(name.into(), value.into())
    }

    /// Returns the value of a property, if configured.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Returns the value of a property or the supplied default.
    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Returns the value of a required property.
    ///
    /// # Errors
    ///
    /// [`PropertyError::Missing`] if the property is not configured.
    pub fn require(&self, name: &str) -> Result<&str, PropertyError> {
        self.get(name)
            .ok_or_else(|| PropertyError::Missing(name.to_string()))
    }

    /// Parses an optional property.
    ///
    /// # Errors
    ///
    /// [`PropertyError::Invalid`] if the property is present but does not parse.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, PropertyError> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PropertyError::Invalid {
                name: name.to_string(),
                value: raw.to_string(),
            })
    }

    /// Iterates properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no properties are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
