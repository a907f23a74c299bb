//! Branch → environment resolution.
//!
//! The mapping is an explicit table. A reference that matches no entry is an
//! error, never a default environment.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DeployError, Result};

/// Name of a deployment environment (e.g. `production`, `staging`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    pub fn new(name: impl Into<String>) -> std::result::Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "environment name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the environment configured as production.
    pub fn is_production(&self, production: &Environment) -> bool {
        self == production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip the `refs/heads/` prefix from a branch reference.
///
/// Other fully qualified references (`refs/tags/...`, `refs/pull/...`) are
/// returned unchanged so they can never collide with a branch of the same
/// short name.
pub fn normalize_reference(reference: &str) -> &str {
    reference
        .trim()
        .strip_prefix("refs/heads/")
        .unwrap_or_else(|| reference.trim())
}

/// Explicit table of source-control reference → environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchMapping {
    entries: BTreeMap<String, Environment>,
}

impl BranchMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(reference, environment)` pairs.
    ///
    /// Fails if a reference appears twice (after normalization).
    pub fn from_pairs<I, R, E>(pairs: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (R, E)>,
        R: AsRef<str>,
        E: Into<String>,
    {
        let mut mapping = Self::new();
        for (reference, environment) in pairs {
            mapping.insert(reference.as_ref(), Environment::new(environment)?)?;
        }
        Ok(mapping)
    }

    /// Add an entry. Duplicate references are rejected.
    pub fn insert(
        &mut self,
        reference: &str,
        environment: Environment,
    ) -> std::result::Result<(), ConfigError> {
        let key = normalize_reference(reference);
        if key.is_empty() {
            return Err(ConfigError::Invalid(
                "branch reference must not be empty".to_string(),
            ));
        }
        if self.entries.contains_key(key) {
            return Err(ConfigError::DuplicateReference {
                reference: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), environment);
        Ok(())
    }

    /// Resolve `reference` to its environment.
    pub fn resolve(&self, reference: &str) -> Result<&Environment> {
        self.entries
            .get(normalize_reference(reference))
            .ok_or_else(|| DeployError::UnmappedReference {
                reference: reference.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Environment)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
