//! Per-run outcome types and the final deployment report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::image::ImageReference;

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }
}

/// A project whose image was built and pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOutcome {
    pub project: String,
    pub image: ImageReference,
    /// Whether the registry repository had to be created by this run.
    pub repository_created: bool,
}

/// What the Manifest Updater did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ManifestOutcome {
    /// Manifests changed; committed and pushed fast-forward.
    Committed { commit: String, message: String },
    /// Manifests already referenced these images; nothing committed.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MirrorOutcome {
    Mirrored { target: String },
    Skipped { reason: String },
    Failed { target: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    Failed { error: String },
}

/// Who and what triggered a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Branch or full reference that was pushed.
    pub reference: String,
    /// Commit identifier; becomes the image tag.
    pub commit: String,
    #[serde(default)]
    pub actor: Option<String>,
}

impl Trigger {
    pub fn new(reference: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            commit: commit.into(),
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Error summary carried by a failed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Machine-readable kind (see `DeployError::kind`).
    pub kind: String,
    pub message: String,
}

impl From<&DeployError> for ErrorSummary {
    fn from(error: &DeployError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of one complete deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub run_id: String,
    pub trigger: Trigger,
    pub environment: Option<String>,
    pub tag: Option<String>,
    /// Digest of the resolved plan, when resolution succeeded.
    pub plan_digest: Option<String>,
    pub status: RunStatus,
    pub images: Vec<ProjectOutcome>,
    pub manifest: Option<ManifestOutcome>,
    pub mirror: MirrorOutcome,
    pub notification: NotificationOutcome,
    pub error: Option<ErrorSummary>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl DeployReport {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// True when the run succeeded without changing any manifest.
    pub fn is_noop(&self) -> bool {
        self.success() && self.manifest == Some(ManifestOutcome::Unchanged)
    }
}
