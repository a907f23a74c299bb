//! Structured observability hooks for the deployment run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: run start/finish, step
//!   start/finish/skip, image push, manifest commit, non-fatal failures
//!
//! Events are emitted at `info!` level (`warn!` for non-fatal failures) and
//! filtered through `RUST_LOG`.

use tracing::{info, warn};

/// Span covering one deployment run, tagged with run id and reference.
///
/// Attach it with `tracing::Instrument` so it follows the run across awaits:
///
/// ```ignore
/// orchestrate(trigger).instrument(run_span(&run_id, "master")).await;
/// ```
pub fn run_span(run_id: &str, reference: &str) -> tracing::Span {
    tracing::info_span!("shipyard.run", run_id = %run_id, reference = %reference)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, reference: &str, commit: &str) {
    info!(event = "run.started", run_id = %run_id, reference = %reference, commit = %commit);
}

/// Emit event: run finished with duration and overall status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_step_started(step: &str) {
    info!(event = "step.started", step = %step);
}

pub fn emit_step_finished(step: &str, duration_ms: u64) {
    info!(event = "step.finished", step = %step, duration_ms = duration_ms);
}

pub fn emit_step_skipped(step: &str, reason: &str) {
    info!(event = "step.skipped", step = %step, reason = %reason);
}

pub fn emit_step_failed(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "step.failed", step = %step, error = %error);
}

/// Emit event: an image was pushed.
pub fn emit_image_pushed(project: &str, image: &str, repository_created: bool) {
    info!(
        event = "image.pushed",
        project = %project,
        image = %image,
        repository_created = repository_created,
    );
}

pub fn emit_manifest_committed(environment: &str, commit: &str) {
    info!(event = "manifest.committed", environment = %environment, commit = %commit);
}

/// Emit event: mirror failed (warning level, non-fatal).
pub fn emit_mirror_failed(target: &str, error: &dyn std::fmt::Display) {
    warn!(event = "mirror.failed", mirror_target = %target, error = %error);
}

/// Emit event: notification failed (warning level, non-fatal).
pub fn emit_notify_failed(error: &dyn std::fmt::Display) {
    warn!(event = "notify.failed", error = %error);
}
