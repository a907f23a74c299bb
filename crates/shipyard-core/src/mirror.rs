//! Production-only repository mirroring.
//!
//! Best effort: a failed mirror is logged and recorded, never fatal.

use std::sync::Arc;

use tracing::info;

use crate::capabilities::RepositoryMirror;
use crate::error::MirrorError;
use crate::obs;
use crate::report::MirrorOutcome;

pub struct MirrorTrigger {
    mirror: Option<Arc<dyn RepositoryMirror>>,
}

impl MirrorTrigger {
    /// `None` when no mirror target is configured.
    pub fn new(mirror: Option<Arc<dyn RepositoryMirror>>) -> Self {
        Self { mirror }
    }

    /// Mirror the repository if `is_production`, otherwise skip.
    pub async fn run(&self, is_production: bool) -> MirrorOutcome {
        if !is_production {
            obs::emit_step_skipped("mirror", "environment is not production");
            return MirrorOutcome::Skipped {
                reason: "environment is not production".to_string(),
            };
        }
        let Some(mirror) = &self.mirror else {
            obs::emit_step_skipped("mirror", "no mirror configured");
            return MirrorOutcome::Skipped {
                reason: "no mirror configured".to_string(),
            };
        };

        let target = mirror.target();
        match mirror.mirror().await {
            Ok(()) => {
                info!(mirror_target = %target, "Repository mirrored");
                MirrorOutcome::Mirrored { target }
            }
            Err(source) => {
                let err = MirrorError {
                    target: target.clone(),
                    source,
                };
                obs::emit_mirror_failed(&target, &err);
                MirrorOutcome::Failed {
                    target,
                    error: err.to_string(),
                }
            }
        }
    }
}
