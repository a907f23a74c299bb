//! Shipyard - branch-driven container deployments
//!
//! The `shipyard` command maps a pushed branch to an environment, builds and
//! pushes one image per project, updates the environment's GitOps overlay,
//! mirrors production deployments and sends a notification.
//!
//! ## Commands
//!
//! - `deploy`: run a full deployment for a reference and commit
//! - `plan`: show what a deployment would do, without side effects
//! - `resolve`: print the environment a reference maps to
//! - `validate`: load and check the configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use shipyard_core::{
    Capabilities, DeployConfig, DeployOrchestrator, DeployPlan, DeployReport, ManifestOutcome,
    MirrorOutcome, Notification, NotificationOutcome, Notifier, Trigger, DEFAULT_CONFIG_FILE,
};
use shipyard_exec::{
    capabilities_with_notifier, capture_head_sha, current_branch, notifier_from_config,
};

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Branch-driven container deployments with GitOps manifests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the deployment configuration
    #[arg(long, global = true, env = "SHIPYARD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override `registry.host` from the configuration
    #[arg(long, global = true, env = "SHIPYARD_REGISTRY")]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a pushed reference
    Deploy {
        /// Branch or reference that was pushed (default: current branch)
        #[arg(long = "ref", env = "GITHUB_REF_NAME")]
        reference: Option<String>,

        /// Commit id to deploy; becomes the image tag (default: HEAD)
        #[arg(long, env = "GITHUB_SHA")]
        commit: Option<String>,

        /// Who triggered the deployment
        #[arg(long, env = "GITHUB_ACTOR")]
        actor: Option<String>,

        /// Write the JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Checkout holding sources and manifests
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Show the deployment plan without side effects
    Plan {
        #[arg(long = "ref", env = "GITHUB_REF_NAME")]
        reference: Option<String>,

        #[arg(long, env = "GITHUB_SHA")]
        commit: Option<String>,

        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Print the environment a reference maps to
    Resolve {
        #[arg(long = "ref", env = "GITHUB_REF_NAME")]
        reference: String,
    },

    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    shipyard_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(&cli.config, cli.registry.as_deref())?;

    match cli.command {
        Commands::Deploy {
            reference,
            commit,
            actor,
            report,
            workdir,
        } => {
            let trigger = resolve_trigger(reference, commit, actor, &workdir)?;
            cmd_deploy(config, trigger, &workdir, report.as_deref(), cli.json).await
        }
        Commands::Plan {
            reference,
            commit,
            workdir,
        } => {
            let trigger = resolve_trigger(reference, commit, None, &workdir)?;
            cmd_plan(&config, &trigger, cli.json)
        }
        Commands::Resolve { reference } => cmd_resolve(&config, &reference),
        Commands::Validate => cmd_validate(&config, &cli.config),
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(path: &Path, registry: Option<&str>) -> Result<DeployConfig> {
    let mut config = DeployConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(host) = registry {
        config.registry.host = host.to_string();
        config.validate().context("Invalid registry override")?;
    }
    Ok(config)
}

/// Fill in the reference and commit from the checkout when not given.
fn resolve_trigger(
    reference: Option<String>,
    commit: Option<String>,
    actor: Option<String>,
    workdir: &Path,
) -> Result<Trigger> {
    let reference = match reference.filter(|r| !r.trim().is_empty()) {
        Some(reference) => reference,
        None => current_branch(workdir).context("Failed to detect the current branch")?,
    };
    let commit = match commit.filter(|c| !c.trim().is_empty()) {
        Some(commit) => commit,
        None => capture_head_sha(workdir).context("Failed to detect the HEAD commit")?,
    };

    let trigger = Trigger::new(reference, commit);
    Ok(match actor {
        Some(actor) => trigger.with_actor(actor),
        None => trigger,
    })
}

/// Run a full deployment; fails (exit 1) when the run failed.
async fn cmd_deploy(
    config: DeployConfig,
    trigger: Trigger,
    workdir: &Path,
    report_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    info!(reference = %trigger.reference, commit = %trigger.commit, "Starting deployment");

    let notifier = notifier_from_config(config.notify.as_ref(), |name| std::env::var(name).ok())
        .context("Failed to set up the notifier")?;
    let capabilities = capabilities_with_notifier(&config, workdir, notifier);
    let orchestrator = prepare_orchestrator(config, capabilities, &trigger).await?;
    let report = orchestrator.run(&trigger).await;

    if let Some(path) = report_path {
        let body = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_summary(&report));
    }

    match &report.error {
        Some(error) if !report.success() => {
            anyhow::bail!("Deployment failed ({}): {}", error.kind, error.message)
        }
        _ => Ok(()),
    }
}

/// Build the orchestrator; a setup failure is still notified once.
async fn prepare_orchestrator(
    config: DeployConfig,
    capabilities: Capabilities,
    trigger: &Trigger,
) -> Result<DeployOrchestrator> {
    let channel = config.notify.as_ref().and_then(|n| n.channel.clone());
    let notifier = Notifier::new(capabilities.notifier.clone());

    match DeployOrchestrator::new(config, capabilities) {
        Ok(orchestrator) => Ok(orchestrator),
        Err(e) => {
            notifier.notify(&Notification::aborted(trigger, &e, channel)).await;
            Err(e).context("Failed to set up the deployment")
        }
    }
}

fn cmd_plan(config: &DeployConfig, trigger: &Trigger, json: bool) -> Result<()> {
    let plan = plan_for(config, trigger)?;

    if json {
        let mut value = serde_json::to_value(&plan)?;
        value["digest"] = serde_json::Value::String(plan.digest());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Environment: {}", plan.environment);
    println!("Tag:         {}", plan.tag);
    for planned in &plan.images {
        println!(
            "  {} -> {} ({})",
            planned.project,
            planned.image,
            planned.definition.dockerfile.display()
        );
    }
    println!("Manifests:   {}", plan.manifest_dir.display());
    println!("Branch:      {}", plan.manifest_branch);
    println!("Message:     {}", plan.commit_message);
    println!("Mirror:      {}", if plan.is_production { "yes" } else { "no" });
    println!("Digest:      {}", plan.digest());
    Ok(())
}

fn plan_for(config: &DeployConfig, trigger: &Trigger) -> Result<DeployPlan> {
    let mapping = config.branch_mapping()?;
    DeployPlan::resolve(config, &mapping, trigger)
        .with_context(|| format!("Failed to plan deployment of '{}'", trigger.reference))
}

fn cmd_resolve(config: &DeployConfig, reference: &str) -> Result<()> {
    let mapping = config.branch_mapping()?;
    let environment = mapping.resolve(reference)?;
    println!("{environment}");
    Ok(())
}

fn cmd_validate(config: &DeployConfig, path: &Path) -> Result<()> {
    println!(
        "{} is valid: {} branch mapping(s), {} project(s), mirror {}",
        path.display(),
        config.branches.len(),
        config.projects.len(),
        if config.mirror.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}

/// Human-readable report for terminals.
fn render_summary(report: &DeployReport) -> String {
    let mut lines = vec![format!(
        "Deployment {} ({}ms, run {})",
        report.status.as_str(),
        report.duration_ms,
        report.run_id
    )];
    lines.push(format!(
        "  {} @ {} -> {}",
        report.trigger.reference,
        report.trigger.commit,
        report.environment.as_deref().unwrap_or("unmapped")
    ));
    for outcome in &report.images {
        let created = if outcome.repository_created {
            " (repository created)"
        } else {
            ""
        };
        lines.push(format!("  pushed {}{created}", outcome.image));
    }
    match &report.manifest {
        Some(ManifestOutcome::Committed { commit, .. }) => {
            lines.push(format!("  manifests committed {commit}"))
        }
        Some(ManifestOutcome::Unchanged) => lines.push("  manifests unchanged".to_string()),
        None => {}
    }
    lines.push(match &report.mirror {
        MirrorOutcome::Mirrored { target } => format!("  mirrored to {target}"),
        MirrorOutcome::Skipped { reason } => format!("  mirror skipped: {reason}"),
        MirrorOutcome::Failed { target, error } => format!("  mirror to {target} failed: {error}"),
    });
    if let NotificationOutcome::Failed { error } = &report.notification {
        lines.push(format!("  notification failed: {error}"));
    }
    if let Some(error) = &report.error {
        lines.push(format!("  error ({}): {}", error.kind, error.message));
    }
    lines.join("\n")
}
