//! `kustomize edit set image` manifest editor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use shipyard_core::{CapabilityResult, ImageReference, ManifestEditor};

use crate::command::{CommandRunner, CommandSpec};

#[derive(Debug, Clone)]
pub struct KustomizeEditor {
    runner: CommandRunner,
    repo_dir: PathBuf,
    program: String,
}

impl KustomizeEditor {
    /// Manifest directories are resolved against `repo_dir`.
    pub fn new(runner: CommandRunner, repo_dir: impl AsRef<Path>) -> Self {
        Self {
            runner,
            repo_dir: repo_dir.as_ref().to_path_buf(),
            program: "kustomize".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn set_image_command(
        &self,
        manifest_dir: &Path,
        image_name: &str,
        image: &ImageReference,
    ) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["edit", "set", "image"])
            .arg(format!("{image_name}={image}"))
            .current_dir(self.repo_dir.join(manifest_dir))
    }
}

#[async_trait]
impl ManifestEditor for KustomizeEditor {
    async fn set_image(
        &self,
        manifest_dir: &Path,
        image_name: &str,
        image: &ImageReference,
    ) -> CapabilityResult<()> {
        let spec = self.set_image_command(manifest_dir, image_name, image);
        self.runner.run(&spec).await?;
        Ok(())
    }
}
