//! Error taxonomy for Shipyard.
//!
//! Fatal errors ([`DeployError`]) abort the critical path of a run. Mirror and
//! notification failures have their own types because they are only ever
//! logged and recorded in the report.

use thiserror::Error;

/// Errors returned by capability adapters (docker, registry, git, ...).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Local and remote history cannot be reconciled by fast-forward.
    #[error("history diverged: {0}")]
    Diverged(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

impl CapabilityError {
    pub fn is_diverged(&self) -> bool {
        matches!(self, CapabilityError::Diverged(_))
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("reference '{reference}' is mapped more than once")]
    DuplicateReference { reference: String },

    #[error("unknown placeholder '{{{placeholder}}}' in template '{template}'")]
    UnknownPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Fatal deployment errors. Any of these short-circuits the remaining build,
/// manifest and mirror steps of a run; the notifier still runs.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no environment is mapped for reference '{reference}'")]
    UnmappedReference { reference: String },

    #[error("project '{project}' has no build definition for environment '{environment}'")]
    MissingBuildDefinition {
        project: String,
        environment: String,
    },

    #[error("invalid image tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("registry repository '{repository}' could not be prepared: {source}")]
    Registry {
        repository: String,
        #[source]
        source: CapabilityError,
    },

    #[error("build of project '{project}' failed: {source}")]
    Build {
        project: String,
        #[source]
        source: CapabilityError,
    },

    #[error("push of image '{image}' failed: {source}")]
    Push {
        image: String,
        #[source]
        source: CapabilityError,
    },

    #[error("manifest update failed: {0}")]
    Manifest(String),

    #[error("cannot fast-forward '{branch}' on '{remote}': {detail}")]
    ReconciliationConflict {
        remote: String,
        branch: String,
        detail: String,
    },

    #[error("version control error: {0}")]
    VersionControl(#[source] CapabilityError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DeployError {
    /// Short machine-readable name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::UnmappedReference { .. } => "unmapped_reference",
            DeployError::MissingBuildDefinition { .. } => "missing_build_definition",
            DeployError::InvalidTag { .. } => "invalid_tag",
            DeployError::Registry { .. } => "registry",
            DeployError::Build { .. } => "build",
            DeployError::Push { .. } => "push",
            DeployError::Manifest(_) => "manifest",
            DeployError::ReconciliationConflict { .. } => "reconciliation_conflict",
            DeployError::VersionControl(_) => "version_control",
            DeployError::Config(_) => "config",
        }
    }
}

/// Mirror failure. Never fatal.
#[derive(Debug, Error)]
#[error("mirror to '{target}' failed: {source}")]
pub struct MirrorError {
    pub target: String,
    #[source]
    pub source: CapabilityError,
}

/// Notification failure. Never fatal.
#[derive(Debug, Error)]
#[error("notification failed: {source}")]
pub struct NotificationError {
    #[source]
    pub source: CapabilityError,
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;
