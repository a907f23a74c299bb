//! GitOps manifest update.
//!
//! Sets the new image references in the environment overlay, commits only
//! when the working tree changed, and synchronizes with the remote using
//! fast-forward-only semantics. The whole sequence runs under a lock shared
//! by every run in the process, so manifest commits are serialized.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::capabilities::{ManifestEditor, VersionControl};
use crate::error::{CapabilityError, DeployError, Result};
use crate::obs;
use crate::plan::DeployPlan;
use crate::report::ManifestOutcome;

/// Applies a plan's image references to the manifest repository.
pub struct ManifestUpdater {
    editor: Arc<dyn ManifestEditor>,
    vcs: Arc<dyn VersionControl>,
    remote: String,
    lock: Arc<Mutex<()>>,
}

impl ManifestUpdater {
    pub fn new(
        editor: Arc<dyn ManifestEditor>,
        vcs: Arc<dyn VersionControl>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            editor,
            vcs,
            remote: remote.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share the commit lock with another updater on the same repository.
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }

    /// Edit, diff, commit and fast-forward sync.
    pub async fn apply(&self, plan: &DeployPlan) -> Result<ManifestOutcome> {
        let _guard = self.lock.lock().await;
        let dir = plan.manifest_dir.as_path();

        self.edit(plan, dir).await?;

        let changed = self
            .vcs
            .has_changes(dir)
            .await
            .map_err(DeployError::VersionControl)?;
        if !changed {
            info!(manifest_dir = %dir.display(), "Manifests already up to date");
            return Ok(ManifestOutcome::Unchanged);
        }

        let base = self.vcs.head().await.map_err(DeployError::VersionControl)?;
        let commit = self
            .vcs
            .commit(dir, &plan.commit_message)
            .await
            .map_err(DeployError::VersionControl)?;
        obs::emit_manifest_committed(plan.environment.as_str(), &commit);

        let branch = plan.manifest_branch.as_str();
        if let Err(e) = self.sync(branch).await {
            self.roll_back(&base).await;
            return Err(e);
        }

        info!(commit = %commit, remote = %self.remote, branch = %branch, "Manifest update pushed");
        Ok(ManifestOutcome::Committed {
            commit,
            message: plan.commit_message.clone(),
        })
    }

    /// Fast-forward from the remote, then push. Never forces.
    async fn sync(&self, branch: &str) -> Result<()> {
        self.vcs
            .pull_fast_forward(&self.remote, branch)
            .await
            .map_err(|e| self.sync_error(branch, e))?;
        self.vcs
            .push(&self.remote, branch)
            .await
            .map_err(|e| self.sync_error(branch, e))
    }

    /// Drop the unpushed manifest commit so a later run edits and commits
    /// again instead of finding a clean tree.
    async fn roll_back(&self, base: &str) {
        match self.vcs.reset_to(base).await {
            Ok(()) => info!(base = %base, "Unpushed manifest commit rolled back"),
            Err(e) => warn!(
                base = %base,
                error = %e,
                "Failed to roll back unpushed manifest commit"
            ),
        }
    }

    /// Set every image. On failure the directory is restored so a partially
    /// edited manifest is never left behind.
    async fn edit(&self, plan: &DeployPlan, dir: &Path) -> Result<()> {
        for planned in &plan.images {
            if let Err(e) = self
                .editor
                .set_image(dir, &planned.image_name, &planned.image)
                .await
            {
                if let Err(restore_err) = self.vcs.restore(dir).await {
                    warn!(
                        manifest_dir = %dir.display(),
                        error = %restore_err,
                        "Failed to restore manifests after edit failure"
                    );
                }
                return Err(DeployError::Manifest(format!(
                    "setting image '{}' in {} failed: {e}",
                    planned.image_name,
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    fn sync_error(&self, branch: &str, error: CapabilityError) -> DeployError {
        match error {
            CapabilityError::Diverged(detail) => DeployError::ReconciliationConflict {
                remote: self.remote.clone(),
                branch: branch.to_string(),
                detail,
            },
            other => DeployError::VersionControl(other),
        }
    }
}
