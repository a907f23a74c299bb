//! Deployment plan: everything a run will do, resolved up front.
//!
//! Resolving a plan performs no side effects. It is where every fail-fast
//! precondition is checked: the reference must be mapped, the commit must be
//! a valid tag, and every project must have a build definition for the
//! environment. Only a fully resolved plan reaches the publisher.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DeployConfig;
use crate::environment::{normalize_reference, BranchMapping, Environment};
use crate::error::Result;
use crate::image::{ImageReference, ImageTag};
use crate::project::BuildDefinition;
use crate::report::Trigger;

/// One project's resolved build and target image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedImage {
    pub project: String,
    /// Key of the image inside the manifest.
    pub image_name: String,
    pub definition: BuildDefinition,
    pub image: ImageReference,
}

/// Fully resolved deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPlan {
    pub environment: Environment,
    pub tag: ImageTag,
    pub images: Vec<PlannedImage>,
    pub manifest_dir: PathBuf,
    pub commit_message: String,
    /// Remote branch that receives the manifest commit.
    pub manifest_branch: String,
    pub is_production: bool,
}

impl DeployPlan {
    /// Resolve a plan for `trigger` against `config`.
    pub fn resolve(
        config: &DeployConfig,
        mapping: &BranchMapping,
        trigger: &Trigger,
    ) -> Result<Self> {
        let environment = mapping.resolve(&trigger.reference)?.clone();
        let tag = ImageTag::parse(&trigger.commit)?;

        let mut images = Vec::with_capacity(config.projects.len());
        for project in &config.projects {
            let definition = project.build_definition(&environment)?.clone();
            let image = config.image_reference(&environment, project, &tag)?;
            images.push(PlannedImage {
                project: project.name.clone(),
                image_name: project.manifest_image_name().to_string(),
                definition,
                image,
            });
        }

        let manifest_branch = config
            .manifest
            .branch
            .clone()
            .unwrap_or_else(|| normalize_reference(&trigger.reference).to_string());

        Ok(Self {
            manifest_dir: config.manifest_dir(&environment)?,
            commit_message: config.commit_message(&environment, &tag)?,
            is_production: environment.is_production(&config.production()?),
            environment,
            tag,
            images,
            manifest_branch,
        })
    }

    /// Deterministic SHA-256 over the ordered plan contents.
    ///
    /// Identical inputs always produce the same digest, so two runs of the
    /// same commit can be recognized as the same deployment.
    pub fn digest(&self) -> String {
        let manifest_dir = self.manifest_dir.to_string_lossy();
        let fields: [&str; 5] = [
            self.environment.as_str(),
            self.tag.as_str(),
            manifest_dir.as_ref(),
            self.commit_message.as_str(),
            self.manifest_branch.as_str(),
        ];

        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update(field.as_bytes());
            hasher.update(b"\0");
        }
        for planned in &self.images {
            hasher.update(planned.project.as_bytes());
            hasher.update(b"\0");
            hasher.update(planned.image.to_string().as_bytes());
            hasher.update(b"\0");
            hasher.update(planned.definition.dockerfile.to_string_lossy().as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }

    /// Rendered image references, in project order.
    pub fn image_references(&self) -> Vec<String> {
        self.images.iter().map(|p| p.image.to_string()).collect()
    }
}
