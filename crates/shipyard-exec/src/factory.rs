//! Wires process-backed adapters from a [`DeployConfig`].

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use shipyard_core::{
    Capabilities, CapabilityResult, DeployConfig, NotificationSink, NotifyConfig, RegistryAdmin,
    RegistryProvider, RepositoryMirror,
};

use crate::command::CommandRunner;
use crate::docker::DockerCli;
use crate::git::GitCli;
use crate::kustomize::KustomizeEditor;
use crate::mirror::GitMirror;
use crate::registry::{EcrRegistry, NoopRegistry};
use crate::webhook::{NoopNotifier, WebhookNotifier};

/// Build the production capability set rooted at `workdir` (the checkout
/// holding both sources and manifests).
pub fn capabilities_from_config(
    config: &DeployConfig,
    workdir: &Path,
) -> CapabilityResult<Capabilities> {
    let notifier = notifier_from_config(config.notify.as_ref(), |name| std::env::var(name).ok())?;
    Ok(capabilities_with_notifier(config, workdir, notifier))
}

/// Like [`capabilities_from_config`] with an already built notification
/// sink, so a caller can still notify when later setup fails.
pub fn capabilities_with_notifier(
    config: &DeployConfig,
    workdir: &Path,
    notifier: Arc<dyn NotificationSink>,
) -> Capabilities {
    let runner = CommandRunner::new(config.execution.command_timeout_secs);

    let registry: Arc<dyn RegistryAdmin> = match config.registry.provider {
        RegistryProvider::Ecr => Arc::new(EcrRegistry::new(
            runner.clone(),
            config.registry.region.clone(),
        )),
        RegistryProvider::None => Arc::new(NoopRegistry),
    };

    let git = Arc::new(GitCli::new(
        runner.clone(),
        workdir,
        config.manifest.author_name.clone(),
        config.manifest.author_email.clone(),
    ));

    let mirror = config.mirror.as_ref().map(|mirror| {
        let mirror: Arc<dyn RepositoryMirror> =
            Arc::new(GitMirror::from_config(mirror, runner.clone(), workdir));
        mirror
    });

    Capabilities {
        builder: Arc::new(DockerCli::new(runner.clone(), workdir)),
        registry,
        vcs: git,
        editor: Arc::new(KustomizeEditor::new(runner, workdir)),
        mirror,
        notifier,
    }
}

/// Webhook sink for `config`, or [`NoopNotifier`] when no URL is available.
pub fn notifier_from_config<F>(
    config: Option<&NotifyConfig>,
    lookup: F,
) -> CapabilityResult<Arc<dyn NotificationSink>>
where
    F: Fn(&str) -> Option<String>,
{
    match config.and_then(|c| webhook_url(c, lookup)) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}

/// The named variable wins over the literal URL.
pub fn webhook_url<F>(config: &NotifyConfig, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = config.webhook_url_env.as_deref().and_then(|name| {
        let value = lookup(name).filter(|v| !v.trim().is_empty());
        if value.is_none() {
            warn!(variable = %name, "Webhook URL variable is not set");
        }
        value
    });
    from_env.or_else(|| config.webhook_url.clone())
}
