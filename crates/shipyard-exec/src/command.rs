//! Timeout-aware external command execution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use shipyard_core::{CapabilityError, CapabilityResult};

const REDACTED: &str = "***";

/// A single external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Values scrubbed from the description and captured output.
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Never show `value` in errors or logs.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Command line safe for logs.
    pub fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        self.redact(&line)
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands with a shared timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CommandRunner {
    /// `timeout_secs == 0` disables the timeout.
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    /// Run `spec` to completion. A non-zero exit is returned as output, not
    /// as an error.
    pub async fn output(&self, spec: &CommandSpec) -> CapabilityResult<CommandOutput> {
        let start = Instant::now();
        let description = spec.describe();
        debug!(command = %description, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|source| CapabilityError::Spawn {
            command: description.clone(),
            source,
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| CapabilityError::Timeout {
                    command: description.clone(),
                    timeout_secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| CapabilityError::Spawn {
            command: description.clone(),
            source,
        })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: spec.redact(&String::from_utf8_lossy(&output.stdout)),
            stderr: spec.redact(&String::from_utf8_lossy(&output.stderr)),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            command = %description,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "Command finished"
        );
        Ok(result)
    }

    /// Run `spec` and require a zero exit code.
    pub async fn run(&self, spec: &CommandSpec) -> CapabilityResult<CommandOutput> {
        let output = self.output(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(failed(spec, &output))
        }
    }
}

/// `CommandFailed` for a finished command.
pub fn failed(spec: &CommandSpec, output: &CommandOutput) -> CapabilityError {
    CapabilityError::CommandFailed {
        command: spec.describe(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    }
}
