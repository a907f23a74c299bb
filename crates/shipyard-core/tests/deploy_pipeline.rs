//! End-to-end deployment runs against in-memory capabilities.

use std::sync::Arc;

use shipyard_core::fakes::{
    MemoryGitOpsRepo, MemoryImageBuilder, MemoryMirror, MemoryRegistry, RecordingNotifier,
};
use shipyard_core::{
    Capabilities, DeployConfig, DeployOrchestrator, ManifestOutcome, MirrorOutcome,
    NotificationOutcome, RepositoryMirror, RunStatus, Trigger,
};

const HOST: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com";

const CONFIG: &str = r#"
[branches]
master = "production"
develop = "staging"

[registry]
host = "123456789012.dkr.ecr.us-east-1.amazonaws.com"

[[projects]]
name = "alpha"
[projects.build.production]
dockerfile = "alpha/Dockerfile.prod"
[projects.build.staging]
dockerfile = "alpha/Dockerfile.staging"

[[projects]]
name = "beta"
[projects.build.production]
dockerfile = "beta/Dockerfile.prod"
[projects.build.staging]
dockerfile = "beta/Dockerfile.staging"

[manifest]
path_template = "deploy/overlays/{environment}"

[mirror]
url = "https://git.example.com/backup.git"
"#;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    builder: Arc<MemoryImageBuilder>,
    registry: Arc<MemoryRegistry>,
    repo: Arc<MemoryGitOpsRepo>,
    mirror: Arc<MemoryMirror>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with(
            MemoryImageBuilder::new(),
            MemoryRegistry::new(),
            MemoryGitOpsRepo::new(),
            MemoryMirror::new("https://git.example.com/backup.git"),
            RecordingNotifier::new(),
        )
    }

    fn with(
        builder: MemoryImageBuilder,
        registry: MemoryRegistry,
        repo: MemoryGitOpsRepo,
        mirror: MemoryMirror,
        notifier: RecordingNotifier,
    ) -> Self {
        Self {
            builder: Arc::new(builder),
            registry: Arc::new(registry),
            repo: Arc::new(repo),
            mirror: Arc::new(mirror),
            notifier: Arc::new(notifier),
        }
    }

    fn orchestrator(&self) -> DeployOrchestrator {
        self.orchestrator_for(CONFIG)
    }

    fn orchestrator_for(&self, toml: &str) -> DeployOrchestrator {
        let config = DeployConfig::from_toml_str(toml).expect("config");
        let mirror: Arc<dyn RepositoryMirror> = self.mirror.clone();
        let capabilities = Capabilities {
            builder: self.builder.clone(),
            registry: self.registry.clone(),
            vcs: self.repo.clone(),
            editor: self.repo.clone(),
            mirror: Some(mirror),
            notifier: self.notifier.clone(),
        };
        DeployOrchestrator::new(config, capabilities).expect("orchestrator")
    }
}

fn image(environment: &str, project: &str, tag: &str) -> String {
    format!("{HOST}/{environment}/{project}:{tag}")
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_master_push_deploys_to_production() {
    let h = Harness::new();
    let trigger = Trigger::new("master", "abc123").with_actor("octocat");

    let report = h.orchestrator().run(&trigger).await;

    assert_eq!(report.status, RunStatus::Success, "error: {:?}", report.error);
    assert_eq!(report.environment.as_deref(), Some("production"));
    assert_eq!(report.tag.as_deref(), Some("abc123"));

    let mut pushes = h.builder.pushes();
    pushes.sort();
    assert_eq!(
        pushes,
        vec![
            image("production", "alpha", "abc123"),
            image("production", "beta", "abc123")
        ]
    );
    let builds = h.builder.builds();
    assert!(builds
        .iter()
        .any(|(dockerfile, _)| dockerfile.ends_with("alpha/Dockerfile.prod")));
    assert!(!builds
        .iter()
        .any(|(dockerfile, _)| dockerfile.to_string_lossy().contains("staging")));

    let mut created = h.registry.created();
    created.sort();
    assert_eq!(created, vec!["production/alpha", "production/beta"]);
    assert!(report.images.iter().all(|o| o.repository_created));

    assert!(matches!(report.manifest, Some(ManifestOutcome::Committed { .. })));
    assert_eq!(
        h.repo
            .committed_image("deploy/overlays/production", "alpha")
            .as_deref(),
        Some(image("production", "alpha", "abc123").as_str())
    );
    assert_eq!(h.repo.ops().last().map(String::as_str), Some("push"));

    assert_eq!(h.mirror.calls(), 1);
    assert!(matches!(report.mirror, MirrorOutcome::Mirrored { .. }));

    assert_eq!(report.notification, NotificationOutcome::Sent);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, RunStatus::Success);
    assert_eq!(sent[0].actor.as_deref(), Some("octocat"));
    assert_eq!(sent[0].images.len(), 2);
}

#[tokio::test]
async fn test_full_reference_form_resolves_like_branch_name() {
    let h = Harness::new();
    let report = h
        .orchestrator()
        .run(&Trigger::new("refs/heads/develop", "def456"))
        .await;

    assert!(report.success());
    assert_eq!(report.environment.as_deref(), Some("staging"));
    assert!(h
        .builder
        .pushes()
        .contains(&image("staging", "beta", "def456")));
    assert_eq!(
        h.repo
            .committed_image("deploy/overlays/staging", "beta")
            .as_deref(),
        Some(image("staging", "beta", "def456").as_str())
    );
}

#[tokio::test]
async fn test_existing_repositories_are_not_recreated() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new()
            .with_repository("production/alpha")
            .with_repository("production/beta"),
        MemoryGitOpsRepo::new(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert!(report.success());
    assert!(h.registry.created().is_empty());
    assert!(report.images.iter().all(|o| !o.repository_created));
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_run_of_same_commit_is_noop_for_manifests() {
    let h = Harness::new();
    let orchestrator = h.orchestrator();
    let trigger = Trigger::new("master", "abc123");

    let first = orchestrator.run(&trigger).await;
    let second = orchestrator.run(&trigger).await;

    assert!(first.success());
    assert!(second.success());
    assert_eq!(second.manifest, Some(ManifestOutcome::Unchanged));
    assert!(second.is_noop());
    assert_eq!(h.repo.commits().len(), 1);
    assert_eq!(first.plan_digest, second.plan_digest);
    assert_ne!(first.run_id, second.run_id);
    // no duplicate repositories
    assert_eq!(h.registry.created().len(), 2);
    assert_eq!(h.notifier.attempts(), 2);
}

#[tokio::test]
async fn test_manifest_already_current_commits_nothing() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new()
            .with_committed_image(
                "deploy/overlays/production",
                "alpha",
                &image("production", "alpha", "abc123"),
            )
            .with_committed_image(
                "deploy/overlays/production",
                "beta",
                &image("production", "beta", "abc123"),
            ),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert!(report.is_noop());
    assert!(h.repo.commits().is_empty());
    assert!(!h.repo.ops().contains(&"push".to_string()));
}

// ---------------------------------------------------------------------------
// Fail-fast critical path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unmapped_reference_fails_before_any_side_effect() {
    let h = Harness::new();
    let report = h
        .orchestrator()
        .run(&Trigger::new("feature/login", "abc123"))
        .await;

    assert_eq!(report.status, RunStatus::Failure);
    let error = report.error.as_ref().expect("error summary");
    assert_eq!(error.kind, "unmapped_reference");
    assert!(error.message.contains("feature/login"));
    assert_eq!(report.environment, None);

    assert!(h.builder.builds().is_empty());
    assert_eq!(h.registry.describe_calls(), 0);
    assert!(h.repo.ops().is_empty());
    assert_eq!(h.mirror.calls(), 0);

    assert_eq!(h.notifier.attempts(), 1);
    assert_eq!(h.notifier.sent()[0].status, RunStatus::Failure);
}

#[tokio::test]
async fn test_missing_build_definition_fails_before_any_build() {
    let config = r#"
[branches]
master = "production"
develop = "staging"

[registry]
host = "123456789012.dkr.ecr.us-east-1.amazonaws.com"

[[projects]]
name = "alpha"
[projects.build.production]
dockerfile = "alpha/Dockerfile.prod"
[projects.build.staging]
dockerfile = "alpha/Dockerfile.staging"

[[projects]]
name = "beta"
[projects.build.production]
dockerfile = "beta/Dockerfile.prod"

[manifest]
path_template = "deploy/overlays/{environment}"
"#;
    let h = Harness::new();
    let report = h
        .orchestrator_for(config)
        .run(&Trigger::new("develop", "abc123"))
        .await;

    assert!(!report.success());
    assert_eq!(report.error.as_ref().unwrap().kind, "missing_build_definition");
    assert_eq!(report.environment.as_deref(), Some("staging"));
    assert!(h.builder.builds().is_empty());
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test]
async fn test_invalid_commit_tag_is_rejected() {
    let h = Harness::new();
    let report = h
        .orchestrator()
        .run(&Trigger::new("master", "not a tag"))
        .await;

    assert_eq!(report.error.as_ref().unwrap().kind, "invalid_tag");
    assert!(h.builder.builds().is_empty());
}

#[tokio::test]
async fn test_build_failure_aborts_before_manifests() {
    let h = Harness::with(
        MemoryImageBuilder::new().fail_build_for("production/beta"),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.error.as_ref().unwrap().kind, "build");
    assert!(!h
        .builder
        .pushes()
        .contains(&image("production", "beta", "abc123")));
    assert!(h.repo.ops().is_empty());
    assert_eq!(report.manifest, None);
    assert_eq!(h.mirror.calls(), 0);
    assert!(matches!(report.mirror, MirrorOutcome::Skipped { .. }));
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test]
async fn test_registry_outage_is_registry_error() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new().unavailable(),
        MemoryGitOpsRepo::new(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert_eq!(report.error.as_ref().unwrap().kind, "registry");
    assert!(h.builder.builds().is_empty());
}

#[tokio::test]
async fn test_diverged_manifest_remote_is_reconciliation_conflict() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new().with_diverged_remote(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.error.as_ref().unwrap().kind, "reconciliation_conflict");
    assert!(!h.repo.ops().contains(&"push".to_string()));
    // images were already published
    assert_eq!(report.images.len(), 2);
    assert_eq!(h.mirror.calls(), 0);
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test]
async fn test_retry_after_conflict_never_reports_lost_update_as_success() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new().with_diverged_remote(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::new(),
    );
    let orchestrator = h.orchestrator();
    let trigger = Trigger::new("master", "abc123");

    let first = orchestrator.run(&trigger).await;
    assert_eq!(first.error.as_ref().unwrap().kind, "reconciliation_conflict");
    assert_eq!(h.repo.unpushed_count(), 0);

    let retry = orchestrator.run(&trigger).await;
    assert_eq!(retry.status, RunStatus::Failure);
    assert_ne!(retry.manifest, Some(ManifestOutcome::Unchanged));
    assert_eq!(retry.error.as_ref().unwrap().kind, "reconciliation_conflict");
    assert!(h.repo.pushed_commits().is_empty());
    assert_eq!(h.notifier.attempts(), 2);
}

// ---------------------------------------------------------------------------
// Mirror and notification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mirror_only_for_production() {
    let h = Harness::new();
    let report = h.orchestrator().run(&Trigger::new("develop", "abc123")).await;

    assert!(report.success());
    assert_eq!(h.mirror.calls(), 0);
    assert!(matches!(report.mirror, MirrorOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_mirror_failure_does_not_fail_run() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new(),
        MemoryMirror::failing("https://git.example.com/backup.git", "authentication failed"),
        RecordingNotifier::new(),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert_eq!(report.status, RunStatus::Success);
    assert!(matches!(report.mirror, MirrorOutcome::Failed { ref error, .. }
        if error.contains("authentication failed")));
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_notifier_failure_does_not_fail_run() {
    let h = Harness::with(
        MemoryImageBuilder::new(),
        MemoryRegistry::new(),
        MemoryGitOpsRepo::new(),
        MemoryMirror::new("https://git.example.com/backup.git"),
        RecordingNotifier::failing("webhook returned 500"),
    );

    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    assert_eq!(report.status, RunStatus::Success);
    assert!(matches!(report.notification, NotificationOutcome::Failed { ref error }
        if error.contains("webhook returned 500")));
    // attempted once, never retried
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_serialize_manifest_commits() {
    let h = Harness::new();
    let lock = Arc::new(tokio::sync::Mutex::new(()));
    let a = h.orchestrator().with_manifest_lock(lock.clone());
    let b = h.orchestrator().with_manifest_lock(lock);

    let ta = Trigger::new("master", "aaa111");
    let tb = Trigger::new("develop", "bbb222");
    let (ra, rb) = tokio::join!(a.run(&ta), b.run(&tb));

    assert!(ra.success());
    assert!(rb.success());
    assert_eq!(h.repo.commits().len(), 2);

    // each manifest sequence is contiguous
    let manifest_ops: Vec<String> = h
        .repo
        .ops()
        .into_iter()
        .filter(|op| !op.starts_with("set_image"))
        .collect();
    assert_eq!(
        manifest_ops,
        vec!["status", "commit", "pull", "push", "status", "commit", "pull", "push"]
    );
    assert_eq!(h.notifier.attempts(), 2);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let h = Harness::new();
    let report = h.orchestrator().run(&Trigger::new("master", "abc123")).await;

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["status"], "success");
    assert_eq!(json["environment"], "production");
    assert_eq!(json["manifest"]["outcome"], "committed");
    assert_eq!(json["mirror"]["outcome"], "mirrored");
    assert_eq!(json["notification"]["outcome"], "sent");
    assert_eq!(json["plan_digest"].as_str().map(str::len), Some(64));
}
