//! `git push --mirror` repository backup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::warn;

use shipyard_core::{CapabilityError, CapabilityResult, MirrorConfig, RepositoryMirror};

use crate::command::{CommandRunner, CommandSpec};

type VarLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Pushes every ref of the local clone to a mirror remote.
///
/// HTTP(S) credentials are read from their variables on each mirror and
/// injected into the push URL; they are redacted from every error and log
/// line. A missing variable fails the mirror, not the construction.
#[derive(Clone)]
pub struct GitMirror {
    runner: CommandRunner,
    repo_dir: PathBuf,
    url: String,
    username_env: Option<String>,
    password_env: Option<String>,
    lookup: VarLookup,
}

impl GitMirror {
    /// Build from config, reading credentials from the process environment.
    pub fn from_config(
        config: &MirrorConfig,
        runner: CommandRunner,
        repo_dir: impl AsRef<Path>,
    ) -> Self {
        Self::from_config_with(config, runner, repo_dir, |name| std::env::var(name).ok())
    }

    /// Like [`GitMirror::from_config`] with an explicit variable lookup.
    pub fn from_config_with<F>(
        config: &MirrorConfig,
        runner: CommandRunner,
        repo_dir: impl AsRef<Path>,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            runner,
            repo_dir: repo_dir.as_ref().to_path_buf(),
            url: config.url.clone(),
            username_env: config.username_env.clone(),
            password_env: config.password_env.clone(),
            lookup: Arc::new(lookup),
        }
    }

    fn credential(&self, var: Option<&str>) -> CapabilityResult<Option<String>> {
        match var {
            None => Ok(None),
            Some(name) => (self.lookup)(name).map(Some).ok_or_else(|| {
                CapabilityError::Other(format!("mirror credential variable {name} is not set"))
            }),
        }
    }

    /// `git push --mirror` with credentials resolved and registered as secrets.
    pub fn push_command(&self) -> CapabilityResult<CommandSpec> {
        let username = self.credential(self.username_env.as_deref())?;
        let password = self.credential(self.password_env.as_deref())?;

        let command = |push_url: &str| {
            CommandSpec::new("git")
                .args(["push", "--mirror", push_url])
                .current_dir(&self.repo_dir)
        };
        if username.is_none() && password.is_none() {
            return Ok(command(&self.url));
        }

        let mut url = match Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                warn!(url = %self.url, "Mirror credentials ignored for non-HTTP URL");
                return Ok(command(&self.url));
            }
        };
        let invalid = |_| CapabilityError::Other("mirror URL cannot carry credentials".to_string());
        let mut secrets = Vec::new();
        // a token alone still needs some user name in the URL
        let user = username.clone().unwrap_or_else(|| "git".to_string());
        url.set_username(&user).map_err(invalid)?;
        if let Some(password) = &password {
            url.set_password(Some(password)).map_err(invalid)?;
            secrets.push(password.clone());
            if let Some(encoded) = url.password() {
                secrets.push(encoded.to_string());
            }
        }
        if username.is_some() {
            secrets.push(url.username().to_string());
        }

        Ok(secrets
            .into_iter()
            .fold(command(url.as_str()), |spec, secret| spec.secret(secret)))
    }
}

impl std::fmt::Debug for GitMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitMirror")
            .field("repo_dir", &self.repo_dir)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RepositoryMirror for GitMirror {
    async fn mirror(&self) -> CapabilityResult<()> {
        let spec = self.push_command()?;
        self.runner.run(&spec).await?;
        Ok(())
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}
