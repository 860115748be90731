//! Container options.
//!
//! Options can be built in code, read from environment variables or, with
//! the `config` feature, deserialized from JSON.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

/// Depth guard used when circular dependency detection is switched off.
pub const DEFAULT_MAX_RESOLVE_DEPTH: usize = 50;

/// Tunables of a container.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::ContainerOptions;
///
/// let options = ContainerOptions::default();
/// assert!(options.circular_dependency_detection);
/// assert_eq!(options.max_resolve_depth, 50);
///
/// let relaxed = ContainerOptions {
///     circular_dependency_detection: false,
///     ..ContainerOptions::default()
/// };
/// assert!(!relaxed.circular_dependency_detection);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Fail fast when a component is requested while already being activated.
    pub circular_dependency_detection: bool,
    /// Maximum activation depth; only enforced with detection switched off.
    pub max_resolve_depth: usize,
    /// Drop registration-only reflection metadata once the container is built.
    pub evict_registration_cache: bool,
    /// Register the collection, lazy, factory and owned sources.
    pub default_sources: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            circular_dependency_detection: true,
            max_resolve_depth: DEFAULT_MAX_RESOLVE_DEPTH,
            evict_registration_cache: true,
            default_sources: true,
        }
    }
}

const ENV_PREFIX: &str = "FERROUS_IOC_";

impl ContainerOptions {
    /// Defaults overridden by `FERROUS_IOC_*` environment variables.
    ///
    /// Recognized: `CIRCULAR_DEPENDENCY_DETECTION`, `MAX_RESOLVE_DEPTH`,
    /// `EVICT_REGISTRATION_CACHE`, `DEFAULT_SOURCES`.
    pub fn from_env() -> DiResult<Self> {
        Self::from_lookup(|name| env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DiResult<Self> {
        let mut options = Self::default();
        if let Some(value) = lookup("CIRCULAR_DEPENDENCY_DETECTION") {
            options.circular_dependency_detection = parse_bool("CIRCULAR_DEPENDENCY_DETECTION", &value)?;
        }
        if let Some(value) = lookup("MAX_RESOLVE_DEPTH") {
            options.max_resolve_depth = value.trim().parse().map_err(|_| {
                DiError::Configuration(format!("{ENV_PREFIX}MAX_RESOLVE_DEPTH is not a number: {value}"))
            })?;
        }
        if let Some(value) = lookup("EVICT_REGISTRATION_CACHE") {
            options.evict_registration_cache = parse_bool("EVICT_REGISTRATION_CACHE", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_SOURCES") {
            options.default_sources = parse_bool("DEFAULT_SOURCES", &value)?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Options from a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| DiError::Configuration(format!("invalid container options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects settings that would make every resolve fail.
    ///
    /// The depth guard only runs with detection off, so a zero depth is
    /// accepted while detection is on.
    pub fn validate(&self) -> DiResult<()> {
        if !self.circular_dependency_detection && self.max_resolve_depth == 0 {
            return Err(DiError::Configuration(
                "max_resolve_depth must be at least 1 when circular dependency detection is off".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> DiResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DiError::Configuration(format!(
            "{ENV_PREFIX}{name} is not a boolean: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn lookup_overrides_defaults() {
        let options = ContainerOptions::from_lookup(lookup(&[
            ("CIRCULAR_DEPENDENCY_DETECTION", "off"),
            ("MAX_RESOLVE_DEPTH", " 12 "),
        ]))
        .unwrap();
        assert!(!options.circular_dependency_detection);
        assert_eq!(options.max_resolve_depth, 12);
        assert!(options.default_sources);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ContainerOptions::from_lookup(lookup(&[("DEFAULT_SOURCES", "maybe")])).is_err());
        assert!(ContainerOptions::from_lookup(lookup(&[
            ("CIRCULAR_DEPENDENCY_DETECTION", "off"),
            ("MAX_RESOLVE_DEPTH", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn zero_depth_is_unused_while_detection_is_on() {
        let options = ContainerOptions::from_lookup(lookup(&[("MAX_RESOLVE_DEPTH", "0")])).unwrap();
        assert!(options.circular_dependency_detection);
        assert_eq!(options.max_resolve_depth, 0);
    }

    #[cfg(feature = "config")]
    #[test]
    fn json_keeps_missing_fields_default() {
        let options = ContainerOptions::from_json_str(r#"{"max_resolve_depth": 8}"#).unwrap();
        assert_eq!(options.max_resolve_depth, 8);
        assert!(options.circular_dependency_detection);
    }
}
