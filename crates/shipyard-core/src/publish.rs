//! Image build and push.
//!
//! For each planned image: ensure the registry repository exists (create
//! only if absent), build with the environment's build definition tagged as
//! the final reference, then push. Projects run concurrently up to a bound;
//! the first failure aborts the whole publish and drops outstanding work.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::capabilities::{ImageBuilder, RegistryAdmin};
use crate::error::{DeployError, Result};
use crate::obs;
use crate::plan::PlannedImage;
use crate::report::ProjectOutcome;

/// Builds and pushes the images of a plan.
pub struct ImagePublisher {
    builder: Arc<dyn ImageBuilder>,
    registry: Arc<dyn RegistryAdmin>,
    max_parallel: usize,
}

impl ImagePublisher {
    pub fn new(
        builder: Arc<dyn ImageBuilder>,
        registry: Arc<dyn RegistryAdmin>,
        max_parallel: usize,
    ) -> Self {
        Self {
            builder,
            registry,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Publish every image; outcomes are returned in input order.
    pub async fn publish_all(&self, images: &[PlannedImage]) -> Result<Vec<ProjectOutcome>> {
        let mut outcomes: Vec<(usize, ProjectOutcome)> = stream::iter(images.iter().enumerate())
            .map(|(index, planned)| async move {
                self.publish(planned).await.map(|outcome| (index, outcome))
            })
            .buffer_unordered(self.max_parallel)
            .try_collect()
            .await?;

        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Ensure repository, build, push one image.
    pub async fn publish(&self, planned: &PlannedImage) -> Result<ProjectOutcome> {
        let start = Instant::now();
        let image = &planned.image;

        let repository_created = self.ensure_repository(image.repository()).await?;

        debug!(project = %planned.project, image = %image, "Building image");
        self.builder
            .build(&planned.definition, image)
            .await
            .map_err(|source| DeployError::Build {
                project: planned.project.clone(),
                source,
            })?;

        debug!(project = %planned.project, image = %image, "Pushing image");
        self.builder
            .push(image)
            .await
            .map_err(|source| DeployError::Push {
                image: image.to_string(),
                source,
            })?;

        obs::emit_image_pushed(&planned.project, &image.to_string(), repository_created);
        info!(
            project = %planned.project,
            duration_ms = start.elapsed().as_millis() as u64,
            "Image published"
        );

        Ok(ProjectOutcome {
            project: planned.project.clone(),
            image: image.clone(),
            repository_created,
        })
    }

    /// Create `repository` if it does not exist. Returns whether it was created.
    async fn ensure_repository(&self, repository: &str) -> Result<bool> {
        let registry_err = |source| DeployError::Registry {
            repository: repository.to_string(),
            source,
        };

        if self
            .registry
            .repository_exists(repository)
            .await
            .map_err(registry_err)?
        {
            return Ok(false);
        }

        info!(repository = %repository, "Creating registry repository");
        self.registry
            .create_repository(repository)
            .await
            .map_err(registry_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemoryImageBuilder, MemoryRegistry};
    use crate::image::{ImageReference, ImageTag};
    use crate::project::BuildDefinition;

    fn planned(project: &str, tag: &str) -> PlannedImage {
        PlannedImage {
            project: project.to_string(),
            image_name: project.to_string(),
            definition: BuildDefinition::new(format!("{project}/Dockerfile"), project),
            image: ImageReference::new(
                "registry.example.com",
                format!("production/{project}"),
                ImageTag::parse(tag).unwrap(),
            ),
        }
    }

    #[tokio::test]
    async fn test_publish_creates_missing_repository_only() {
        let builder = Arc::new(MemoryImageBuilder::new());
        let registry = Arc::new(MemoryRegistry::new().with_repository("production/alpha"));
        let publisher = ImagePublisher::new(builder.clone(), registry.clone(), 2);

        let outcomes = publisher
            .publish_all(&[planned("alpha", "abc123"), planned("beta", "abc123")])
            .await
            .expect("publish");

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].project, "alpha");
        assert!(!outcomes[0].repository_created);
        assert_eq!(outcomes[1].project, "beta");
        assert!(outcomes[1].repository_created);
        assert_eq!(registry.created(), vec!["production/beta".to_string()]);
        assert_eq!(builder.pushes().len(), 2);
    }

    #[tokio::test]
    async fn test_build_failure_maps_to_build_error() {
        let builder = Arc::new(MemoryImageBuilder::new().fail_build_for("production/beta"));
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = ImagePublisher::new(builder.clone(), registry, 1);

        let err = publisher
            .publish_all(&[planned("alpha", "abc"), planned("beta", "abc")])
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Build { ref project, .. } if project == "beta"));
        assert!(!builder.pushes().iter().any(|p| p.contains("beta")));
    }

    #[tokio::test]
    async fn test_push_failure_maps_to_push_error() {
        let builder = Arc::new(MemoryImageBuilder::new().fail_push_for("production/alpha"));
        let publisher = ImagePublisher::new(builder, Arc::new(MemoryRegistry::new()), 1);
        let err = publisher.publish(&planned("alpha", "abc")).await.unwrap_err();
        assert!(matches!(err, DeployError::Push { ref image, .. } if image.ends_with("alpha:abc")));
    }

    #[tokio::test]
    async fn test_registry_failure_stops_before_build() {
        let builder = Arc::new(MemoryImageBuilder::new());
        let registry = Arc::new(MemoryRegistry::new().unavailable());
        let publisher = ImagePublisher::new(builder.clone(), registry, 1);
        let err = publisher.publish(&planned("alpha", "abc")).await.unwrap_err();
        assert!(matches!(err, DeployError::Registry { .. }));
        assert!(builder.builds().is_empty());
    }

    #[tokio::test]
    async fn test_republishing_same_tag_is_idempotent() {
        let builder = Arc::new(MemoryImageBuilder::new());
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = ImagePublisher::new(builder.clone(), registry.clone(), 1);

        let first = publisher.publish(&planned("alpha", "abc123")).await.unwrap();
        let second = publisher.publish(&planned("alpha", "abc123")).await.unwrap();

        assert_eq!(first.image, second.image);
        assert!(first.repository_created);
        assert!(!second.repository_created);
        assert_eq!(registry.created().len(), 1);
        let pushes = builder.pushes();
        assert_eq!(pushes[0], pushes[1]);
    }
}
