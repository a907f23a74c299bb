//! Deployment orchestration and run reporting.
//!
//! A run is: resolve → publish → manifest (the critical path, fail-fast),
//! then mirror (production only, best effort), then notify (always, once).

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::capabilities::{
    ImageBuilder, ManifestEditor, NotificationSink, RegistryAdmin, RepositoryMirror,
    VersionControl,
};
use crate::config::DeployConfig;
use crate::environment::BranchMapping;
use crate::error::Result;
use crate::manifest::ManifestUpdater;
use crate::mirror::MirrorTrigger;
use crate::notify::{Notification, Notifier};
use crate::obs;
use crate::plan::DeployPlan;
use crate::publish::ImagePublisher;
use crate::report::{
    DeployReport, ErrorSummary, ManifestOutcome, MirrorOutcome, ProjectOutcome, RunStatus,
    Trigger,
};

/// The external collaborators a run needs.
#[derive(Clone)]
pub struct Capabilities {
    pub builder: Arc<dyn ImageBuilder>,
    pub registry: Arc<dyn RegistryAdmin>,
    pub vcs: Arc<dyn VersionControl>,
    pub editor: Arc<dyn ManifestEditor>,
    /// `None` disables mirroring.
    pub mirror: Option<Arc<dyn RepositoryMirror>>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// What the critical path got done before it finished or failed.
#[derive(Debug, Default)]
struct Progress {
    environment: Option<String>,
    tag: Option<String>,
    plan_digest: Option<String>,
    is_production: bool,
    images: Vec<ProjectOutcome>,
    manifest: Option<ManifestOutcome>,
}

/// Runs deployments for one configuration.
pub struct DeployOrchestrator {
    config: DeployConfig,
    mapping: BranchMapping,
    publisher: ImagePublisher,
    manifests: ManifestUpdater,
    mirror: MirrorTrigger,
    notifier: Notifier,
    channel: Option<String>,
}

impl DeployOrchestrator {
    pub fn new(config: DeployConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;
        let mapping = config.branch_mapping()?;
        let publisher = ImagePublisher::new(
            capabilities.builder,
            capabilities.registry,
            config.execution.max_parallel_builds,
        );
        let manifests = ManifestUpdater::new(
            capabilities.editor,
            capabilities.vcs,
            config.manifest.remote.clone(),
        );
        let channel = config.notify.as_ref().and_then(|n| n.channel.clone());

        Ok(Self {
            mapping,
            publisher,
            manifests,
            mirror: MirrorTrigger::new(capabilities.mirror),
            notifier: Notifier::new(capabilities.notifier),
            channel,
            config,
        })
    }

    /// Share the manifest commit lock with other orchestrators of the same
    /// repository.
    pub fn with_manifest_lock(mut self, lock: Arc<tokio::sync::Mutex<()>>) -> Self {
        self.manifests = self.manifests.with_lock(lock);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Resolve the plan for `trigger` without side effects.
    pub fn plan(&self, trigger: &Trigger) -> Result<DeployPlan> {
        DeployPlan::resolve(&self.config, &self.mapping, trigger)
    }

    /// Execute a full run. Never returns an error: failures are recorded in
    /// the report, and the notifier has been attempted exactly once when
    /// this returns.
    pub async fn run(&self, trigger: &Trigger) -> DeployReport {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, &trigger.reference);
        self.run_with_id(run_id, trigger).instrument(span).await
    }

    async fn run_with_id(&self, run_id: String, trigger: &Trigger) -> DeployReport {
        let started_at = Utc::now();
        let start = Instant::now();
        obs::emit_run_started(&run_id, &trigger.reference, &trigger.commit);

        let mut progress = Progress::default();
        let outcome = self.execute(trigger, &mut progress).await;

        let mirror = match &outcome {
            Ok(()) => self.mirror.run(progress.is_production).await,
            Err(_) => {
                obs::emit_step_skipped("mirror", "deployment failed");
                MirrorOutcome::Skipped {
                    reason: "deployment failed".to_string(),
                }
            }
        };

        let (status, error) = match &outcome {
            Ok(()) => (RunStatus::Success, None),
            Err(e) => (RunStatus::Failure, Some(ErrorSummary::from(e))),
        };

        let notification = Notification {
            run_id: run_id.clone(),
            status,
            reference: trigger.reference.clone(),
            commit: trigger.commit.clone(),
            actor: trigger.actor.clone(),
            environment: progress.environment.clone(),
            tag: progress.tag.clone(),
            images: progress.images.iter().map(|o| o.image.to_string()).collect(),
            manifest: progress.manifest.clone(),
            mirror: mirror.clone(),
            error: error.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            channel: self.channel.clone(),
        };
        let notification = self.notifier.notify(&notification).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id, duration_ms, status == RunStatus::Success);

        DeployReport {
            run_id,
            trigger: trigger.clone(),
            environment: progress.environment,
            tag: progress.tag,
            plan_digest: progress.plan_digest,
            status,
            images: progress.images,
            manifest: progress.manifest,
            mirror,
            notification,
            error,
            started_at,
            duration_ms,
        }
    }

    /// The critical path: resolve, publish, update manifests.
    async fn execute(&self, trigger: &Trigger, progress: &mut Progress) -> Result<()> {
        let plan = step("resolve", async { self.resolve(trigger, progress) }).await?;

        let digest = plan.digest();
        info!(
            environment = %plan.environment,
            tag = %plan.tag,
            images = plan.images.len(),
            plan_digest = %digest,
            "Deployment plan resolved"
        );
        progress.tag = Some(plan.tag.to_string());
        progress.plan_digest = Some(digest);
        progress.is_production = plan.is_production;

        progress.images = step("publish", self.publisher.publish_all(&plan.images)).await?;
        progress.manifest = Some(step("manifest", self.manifests.apply(&plan)).await?);
        Ok(())
    }

    /// Resolve the environment first so it is reported even when the rest
    /// of the plan (build definitions, tag) is invalid.
    fn resolve(&self, trigger: &Trigger, progress: &mut Progress) -> Result<DeployPlan> {
        let environment = self.mapping.resolve(&trigger.reference)?;
        progress.environment = Some(environment.to_string());
        self.plan(trigger)
    }
}

/// Run one named step with start/finish/failure events.
async fn step<T>(name: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let start = Instant::now();
    obs::emit_step_started(name);
    match fut.await {
        Ok(value) => {
            obs::emit_step_finished(name, start.elapsed().as_millis() as u64);
            Ok(value)
        }
        Err(e) => {
            obs::emit_step_failed(name, &e);
            Err(e)
        }
    }
}

impl std::fmt::Debug for DeployOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployOrchestrator")
            .field("branches", &self.mapping.len())
            .field("projects", &self.config.projects.len())
            .finish()
    }
}
