//! Registry repository management.

use async_trait::async_trait;
use tracing::info;

use shipyard_core::{CapabilityResult, RegistryAdmin};

use crate::command::{failed, CommandRunner, CommandSpec};

const NOT_FOUND: &str = "RepositoryNotFoundException";
const ALREADY_EXISTS: &str = "RepositoryAlreadyExistsException";

/// AWS ECR through the `aws` CLI.
#[derive(Debug, Clone)]
pub struct EcrRegistry {
    runner: CommandRunner,
    region: Option<String>,
    program: String,
}

impl EcrRegistry {
    pub fn new(runner: CommandRunner, region: Option<String>) -> Self {
        Self {
            runner,
            region,
            program: "aws".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn ecr(&self, action: &str, repository: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program).args(["ecr", action]);
        spec = if action == "describe-repositories" {
            spec.arg("--repository-names").arg(repository)
        } else {
            spec.arg("--repository-name").arg(repository)
        };
        if let Some(region) = &self.region {
            spec = spec.arg("--region").arg(region);
        }
        spec.args(["--output", "json"])
    }
}

#[async_trait]
impl RegistryAdmin for EcrRegistry {
    async fn repository_exists(&self, repository: &str) -> CapabilityResult<bool> {
        let spec = self.ecr("describe-repositories", repository);
        let output = self.runner.output(&spec).await?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.contains(NOT_FOUND) {
            return Ok(false);
        }
        Err(failed(&spec, &output))
    }

    async fn create_repository(&self, repository: &str) -> CapabilityResult<()> {
        let spec = self.ecr("create-repository", repository);
        let output = self.runner.output(&spec).await?;
        if output.success() {
            info!(repository = %repository, "ECR repository created");
            return Ok(());
        }
        // lost a race with a concurrent run
        if output.stderr.contains(ALREADY_EXISTS) {
            return Ok(());
        }
        Err(failed(&spec, &output))
    }
}

/// Registry that needs no repository management (created on push).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistry;

#[async_trait]
impl RegistryAdmin for NoopRegistry {
    async fn repository_exists(&self, _repository: &str) -> CapabilityResult<bool> {
        Ok(true)
    }

    async fn create_repository(&self, _repository: &str) -> CapabilityResult<()> {
        Ok(())
    }
}
