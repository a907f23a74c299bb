//! `git` CLI version control for the manifest working tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tracing::debug;

use shipyard_core::{CapabilityError, CapabilityResult, VersionControl};

use crate::command::{failed, CommandOutput, CommandRunner, CommandSpec};

/// Version control over a local clone. All paths are relative to `repo_dir`.
#[derive(Debug, Clone)]
pub struct GitCli {
    runner: CommandRunner,
    repo_dir: PathBuf,
    author_name: String,
    author_email: String,
}

impl GitCli {
    pub fn new(
        runner: CommandRunner,
        repo_dir: impl AsRef<Path>,
        author_name: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            repo_dir: repo_dir.as_ref().to_path_buf(),
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new("git").current_dir(&self.repo_dir)
    }

    async fn run(&self, spec: CommandSpec) -> CapabilityResult<CommandOutput> {
        self.runner.run(&spec).await
    }
}

fn path_arg(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.to_string_lossy().into_owned()
    }
}

fn is_ff_refusal(stderr: &str) -> bool {
    stderr.contains("Not possible to fast-forward")
        || stderr.contains("Diverging branches")
        || stderr.contains("[rejected]")
        || stderr.contains("non-fast-forward")
        || stderr.contains("fetch first")
}

#[async_trait]
impl VersionControl for GitCli {
    async fn has_changes(&self, path: &Path) -> CapabilityResult<bool> {
        let output = self
            .run(
                self.git()
                    .args(["status", "--porcelain", "--untracked-files=all", "--"])
                    .arg(path_arg(path)),
            )
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn commit(&self, path: &Path, message: &str) -> CapabilityResult<String> {
        let path = path_arg(path);
        self.run(self.git().args(["add", "--all", "--"]).arg(&path)).await?;
        self.run(
            self.git()
                .arg("-c")
                .arg(format!("user.name={}", self.author_name))
                .arg("-c")
                .arg(format!("user.email={}", self.author_email))
                .args(["commit", "--quiet", "--message"])
                .arg(message)
                .arg("--")
                .arg(&path),
        )
        .await?;

        let sha = self.head().await?;
        debug!(commit = %sha, "Committed manifests");
        Ok(sha)
    }

    async fn head(&self) -> CapabilityResult<String> {
        let output = self.run(self.git().args(["rev-parse", "HEAD"])).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn pull_fast_forward(&self, remote: &str, branch: &str) -> CapabilityResult<()> {
        let spec = self
            .git()
            .args(["pull", "--ff-only", "--no-rebase", remote, branch]);
        let output = self.runner.output(&spec).await?;
        if output.success() {
            return Ok(());
        }
        if is_ff_refusal(&output.stderr) {
            return Err(CapabilityError::Diverged(format!(
                "local branch cannot be fast-forwarded to {remote}/{branch}"
            )));
        }
        // first deployment to a branch the remote does not have yet
        if output.stderr.contains("couldn't find remote ref") {
            debug!(remote = %remote, branch = %branch, "Remote branch does not exist yet");
            return Ok(());
        }
        Err(failed(&spec, &output))
    }

    async fn push(&self, remote: &str, branch: &str) -> CapabilityResult<()> {
        let spec = self
            .git()
            .args(["push", "--porcelain", remote])
            .arg(format!("HEAD:refs/heads/{branch}"));
        let output = self.runner.output(&spec).await?;
        if output.success() {
            return Ok(());
        }
        let text = format!("{}\n{}", output.stdout, output.stderr);
        if is_ff_refusal(&text) {
            return Err(CapabilityError::Diverged(format!(
                "push to {remote}/{branch} rejected as non-fast-forward"
            )));
        }
        Err(failed(&spec, &output))
    }

    async fn reset_to(&self, commit: &str) -> CapabilityResult<()> {
        // --keep refuses instead of discarding unrelated local edits
        self.run(self.git().args(["reset", "--keep", commit])).await?;
        Ok(())
    }

    async fn restore(&self, path: &Path) -> CapabilityResult<()> {
        let path = path_arg(path);
        let checkout = self.git().args(["checkout", "HEAD", "--"]).arg(&path);
        let output = self.runner.output(&checkout).await?;
        // nothing tracked under the path yet
        if !output.success() && !output.stderr.contains("did not match") {
            return Err(failed(&checkout, &output));
        }
        self.run(self.git().args(["clean", "-fd", "--"]).arg(&path)).await?;
        Ok(())
    }
}

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory.
pub fn capture_head_sha(repo_dir: &Path) -> CapabilityResult<String> {
    rev_parse(repo_dir, &["rev-parse", "HEAD"])
}

/// Name of the checked-out branch.
pub fn current_branch(repo_dir: &Path) -> CapabilityResult<String> {
    let branch = rev_parse(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if branch == "HEAD" {
        return Err(CapabilityError::Other(
            "HEAD is detached; pass the reference explicitly".to_string(),
        ));
    }
    Ok(branch)
}

fn rev_parse(repo_dir: &Path, args: &[&str]) -> CapabilityResult<String> {
    let command = format!("git {}", args.join(" "));
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|source| CapabilityError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(CapabilityError::CommandFailed {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        return Err(CapabilityError::Other(format!("{command} returned empty output")));
    }
    Ok(value)
}
