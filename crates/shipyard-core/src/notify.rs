//! Terminal run notification.
//!
//! The notifier fires exactly once per run, whatever happened before it.
//! Delivery is attempted once; a failure is logged and recorded in the
//! report but never changes the run status.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capabilities::NotificationSink;
use crate::error::{DeployError, NotificationError};
use crate::obs;
use crate::report::{
    ErrorSummary, ManifestOutcome, MirrorOutcome, NotificationOutcome, RunStatus, Trigger,
};

/// Payload handed to a [`NotificationSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub run_id: String,
    pub status: RunStatus,
    pub reference: String,
    pub commit: String,
    pub actor: Option<String>,
    pub environment: Option<String>,
    pub tag: Option<String>,
    pub images: Vec<String>,
    pub manifest: Option<ManifestOutcome>,
    pub mirror: MirrorOutcome,
    pub error: Option<ErrorSummary>,
    pub duration_ms: u64,
    /// Chat channel override, if configured.
    pub channel: Option<String>,
}

impl Notification {
    /// Failure notice for a run that could not be set up, so no
    /// orchestrator ever ran for it.
    pub fn aborted(trigger: &Trigger, error: &DeployError, channel: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            status: RunStatus::Failure,
            reference: trigger.reference.clone(),
            commit: trigger.commit.clone(),
            actor: trigger.actor.clone(),
            environment: None,
            tag: None,
            images: Vec::new(),
            manifest: None,
            mirror: MirrorOutcome::Skipped {
                reason: "deployment failed".to_string(),
            },
            error: Some(ErrorSummary::from(error)),
            duration_ms: 0,
            channel,
        }
    }

    /// Human-readable message body for chat transports.
    pub fn text(&self) -> String {
        let marker = match self.status {
            RunStatus::Success => ":white_check_mark:",
            RunStatus::Failure => ":x:",
        };
        let target = self.environment.as_deref().unwrap_or("unmapped");
        let mut lines = vec![format!(
            "{marker} deploy {} to *{target}* from `{}` @ `{}` ({}ms)",
            self.status.as_str(),
            self.reference,
            short_commit(&self.commit),
            self.duration_ms
        )];

        if let Some(actor) = &self.actor {
            lines.push(format!("triggered by {actor}"));
        }
        for image in &self.images {
            lines.push(format!("• {image}"));
        }
        match &self.manifest {
            Some(ManifestOutcome::Committed { commit, .. }) => {
                lines.push(format!("manifest committed {}", short_commit(commit)))
            }
            Some(ManifestOutcome::Unchanged) => lines.push("manifest unchanged".to_string()),
            None => {}
        }
        match &self.mirror {
            MirrorOutcome::Mirrored { target } => lines.push(format!("mirrored to {target}")),
            MirrorOutcome::Failed { error, .. } => lines.push(format!("mirror failed: {error}")),
            MirrorOutcome::Skipped { .. } => {}
        }
        if let Some(error) = &self.error {
            lines.push(format!("error ({}): {}", error.kind, error.message));
        }
        lines.push(format!("run {}", self.run_id));
        lines.join("\n")
    }
}

fn short_commit(commit: &str) -> &str {
    commit
        .char_indices()
        .nth(12)
        .map_or(commit, |(end, _)| &commit[..end])
}

/// Sends the terminal notification of a run.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Deliver `notification` once. Failures are logged, not returned.
    pub async fn notify(&self, notification: &Notification) -> NotificationOutcome {
        match self.sink.send(notification).await {
            Ok(()) => NotificationOutcome::Sent,
            Err(source) => {
                let err = NotificationError { source };
                obs::emit_notify_failed(&err);
                NotificationOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}
