//! Shipyard Exec - process-backed capabilities
//!
//! Implements the `shipyard_core::capabilities` traits on top of external
//! tools:
//! - `docker` for image build/push
//! - `aws ecr` for registry repositories
//! - `git` for the manifest working tree and the production mirror
//! - `kustomize` for overlay edits
//! - an HTTP webhook for run notifications

pub mod command;
pub mod docker;
pub mod factory;
pub mod git;
pub mod kustomize;
pub mod mirror;
pub mod registry;
pub mod webhook;

// Re-export key types
pub use command::{CommandOutput, CommandRunner, CommandSpec};
pub use docker::DockerCli;
pub use factory::{
    capabilities_from_config, capabilities_with_notifier, notifier_from_config, webhook_url,
};
pub use git::{capture_head_sha, current_branch, GitCli};
pub use kustomize::KustomizeEditor;
pub use mirror::GitMirror;
pub use registry::{EcrRegistry, NoopRegistry};
pub use webhook::{NoopNotifier, WebhookNotifier};
