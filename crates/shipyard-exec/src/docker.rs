//! `docker` CLI image builder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use shipyard_core::{BuildDefinition, CapabilityResult, ImageBuilder, ImageReference};

use crate::command::{CommandRunner, CommandSpec};

/// Builds and pushes images with the local `docker` CLI.
///
/// Dockerfile and context paths are resolved against `workdir`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    runner: CommandRunner,
    workdir: PathBuf,
    program: String,
}

impl DockerCli {
    pub fn new(runner: CommandRunner, workdir: impl AsRef<Path>) -> Self {
        Self {
            runner,
            workdir: workdir.as_ref().to_path_buf(),
            program: "docker".to_string(),
        }
    }

    /// Use another docker-compatible binary (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn build_command(
        &self,
        definition: &BuildDefinition,
        image: &ImageReference,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .args(["build", "--file"])
            .arg(self.workdir.join(&definition.dockerfile).to_string_lossy())
            .args(["--tag".to_string(), image.to_string()]);
        for (key, value) in &definition.build_args {
            spec = spec.arg("--build-arg").arg(format!("{key}={value}"));
        }
        spec.arg(self.workdir.join(&definition.context).to_string_lossy())
            .current_dir(&self.workdir)
    }

    pub fn push_command(&self, image: &ImageReference) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("push")
            .arg(image.to_string())
            .current_dir(&self.workdir)
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(
        &self,
        definition: &BuildDefinition,
        image: &ImageReference,
    ) -> CapabilityResult<()> {
        let output = self.runner.run(&self.build_command(definition, image)).await?;
        info!(image = %image, duration_ms = output.duration_ms, "Image built");
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> CapabilityResult<()> {
        self.runner.run(&self.push_command(image)).await?;
        Ok(())
    }
}
