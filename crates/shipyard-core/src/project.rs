//! Declared projects and their per-environment build definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{DeployError, Result};

/// How to build a project's image for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinition {
    /// Path to the Dockerfile, relative to the working directory.
    pub dockerfile: PathBuf,

    /// Build context directory.
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Extra `--build-arg` values.
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

/// A deployable project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,

    /// Image name used as the key in the environment manifest.
    /// Defaults to the project name.
    #[serde(default)]
    pub image_name: Option<String>,

    /// Build definition per environment name.
    #[serde(default)]
    pub build: BTreeMap<String, BuildDefinition>,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_name: None,
            build: BTreeMap::new(),
        }
    }

    /// Add a build definition for `environment`.
    pub fn with_build(mut self, environment: &str, definition: BuildDefinition) -> Self {
        self.build.insert(environment.to_string(), definition);
        self
    }

    pub fn manifest_image_name(&self) -> &str {
        self.image_name.as_deref().unwrap_or(&self.name)
    }

    /// The build definition for `environment`, or `MissingBuildDefinition`.
    pub fn build_definition(&self, environment: &Environment) -> Result<&BuildDefinition> {
        self.build
            .get(environment.as_str())
            .ok_or_else(|| DeployError::MissingBuildDefinition {
                project: self.name.clone(),
                environment: environment.to_string(),
            })
    }
}

impl BuildDefinition {
    pub fn new(dockerfile: impl Into<PathBuf>, context: impl Into<PathBuf>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            context: context.into(),
            build_args: BTreeMap::new(),
        }
    }
}
