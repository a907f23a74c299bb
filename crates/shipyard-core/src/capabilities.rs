//! Capability traits for the external collaborators of a deployment.
//!
//! These traits define the only contract the orchestrator has with the
//! outside world:
//! - `ImageBuilder`: build an image tagged with its reference, push it
//! - `RegistryAdmin`: describe / create registry repositories
//! - `VersionControl`: status, commit, fast-forward sync, push, rollback
//! - `ManifestEditor`: set an image reference in a manifest directory
//! - `RepositoryMirror`: replicate all refs to a secondary store
//! - `NotificationSink`: deliver the terminal run notification
//!
//! All traits are async and backend-agnostic. Process-backed adapters live
//! in `shipyard-exec`; in-memory fakes are in the `fakes` module.

use std::path::Path;

use async_trait::async_trait;

use crate::error::CapabilityResult;
use crate::image::ImageReference;
use crate::notify::Notification;
use crate::project::BuildDefinition;

/// Container build capability.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `definition` and tag the result as `image`.
    async fn build(
        &self,
        definition: &BuildDefinition,
        image: &ImageReference,
    ) -> CapabilityResult<()>;

    /// Push `image` to its registry. Pushing an existing tag again must succeed.
    async fn push(&self, image: &ImageReference) -> CapabilityResult<()>;
}

/// Registry management capability.
#[async_trait]
pub trait RegistryAdmin: Send + Sync {
    async fn repository_exists(&self, repository: &str) -> CapabilityResult<bool>;

    /// Create `repository`. Creating one that already exists is not an error.
    async fn create_repository(&self, repository: &str) -> CapabilityResult<()>;
}

/// Version-control capability over the working tree holding the manifests.
///
/// Guarantees:
/// - `pull_fast_forward` never merges or rebases; divergence is
///   `CapabilityError::Diverged`.
/// - `push` never forces; a non-fast-forward rejection is
///   `CapabilityError::Diverged`.
/// - `reset_to` only moves the local branch; it never touches the remote.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether `path` has uncommitted changes (tracked or untracked).
    async fn has_changes(&self, path: &Path) -> CapabilityResult<bool>;

    /// Commit id of the checked-out branch.
    async fn head(&self) -> CapabilityResult<String>;

    /// Stage `path` and commit it with `message`. Returns the new commit id.
    async fn commit(&self, path: &Path, message: &str) -> CapabilityResult<String>;

    async fn pull_fast_forward(&self, remote: &str, branch: &str) -> CapabilityResult<()>;

    async fn push(&self, remote: &str, branch: &str) -> CapabilityResult<()>;

    /// Move the local branch back to `commit`, dropping later unpushed
    /// commits together with their changes.
    async fn reset_to(&self, commit: &str) -> CapabilityResult<()>;

    /// Discard uncommitted changes under `path`.
    async fn restore(&self, path: &Path) -> CapabilityResult<()>;
}

/// Manifest-editing capability (e.g. `kustomize edit set image`).
#[async_trait]
pub trait ManifestEditor: Send + Sync {
    async fn set_image(
        &self,
        manifest_dir: &Path,
        image_name: &str,
        image: &ImageReference,
    ) -> CapabilityResult<()>;
}

/// Repository mirroring capability.
#[async_trait]
pub trait RepositoryMirror: Send + Sync {
    /// Replicate every ref and all history to the mirror target.
    async fn mirror(&self) -> CapabilityResult<()>;

    /// Target description safe for logs (no credentials).
    fn target(&self) -> String;
}

/// Notification transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> CapabilityResult<()>;
}
