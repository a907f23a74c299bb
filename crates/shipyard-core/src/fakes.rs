//! In-memory fakes for capability traits (testing only)
//!
//! Provides `MemoryImageBuilder`, `MemoryRegistry`, `MemoryGitOpsRepo`,
//! `MemoryMirror` and `RecordingNotifier` that satisfy the trait contracts
//! without any external tools. Each fake records its calls and can be
//! scripted to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::capabilities::*;
use crate::error::{CapabilityError, CapabilityResult};
use crate::image::ImageReference;
use crate::notify::Notification;
use crate::project::BuildDefinition;

fn scripted(message: &str) -> CapabilityError {
    CapabilityError::Other(message.to_string())
}

// ---------------------------------------------------------------------------
// MemoryImageBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BuilderState {
    builds: Vec<(PathBuf, String)>,
    pushes: Vec<String>,
    fail_build: BTreeSet<String>,
    fail_push: BTreeSet<String>,
}

/// Image builder that records builds and pushes by reference string.
#[derive(Debug, Default)]
pub struct MemoryImageBuilder {
    state: Mutex<BuilderState>,
}

impl MemoryImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail builds whose repository path equals `repository`.
    pub fn fail_build_for(self, repository: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_build
            .insert(repository.to_string());
        self
    }

    /// Fail pushes whose repository path equals `repository`.
    pub fn fail_push_for(self, repository: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_push
            .insert(repository.to_string());
        self
    }

    /// `(dockerfile, image)` pairs in call order.
    pub fn builds(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().unwrap().builds.clone()
    }

    /// Pushed image references in call order.
    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }
}

#[async_trait]
impl ImageBuilder for MemoryImageBuilder {
    async fn build(
        &self,
        definition: &BuildDefinition,
        image: &ImageReference,
    ) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_build.contains(image.repository()) {
            return Err(CapabilityError::CommandFailed {
                command: format!("docker build -t {image}"),
                exit_code: 1,
                stderr: "scripted build failure".to_string(),
            });
        }
        state
            .builds
            .push((definition.dockerfile.clone(), image.to_string()));
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_push.contains(image.repository()) {
            return Err(scripted("scripted push failure"));
        }
        state.pushes.push(image.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryState {
    repositories: BTreeSet<String>,
    created: Vec<String>,
    describe_calls: usize,
    unavailable: bool,
}

/// Registry holding a set of repository paths.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(self, repository: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .repositories
            .insert(repository.to_string());
        self
    }

    /// Make every call fail as if the registry API were down.
    pub fn unavailable(self) -> Self {
        self.state.lock().unwrap().unavailable = true;
        self
    }

    /// Repositories created through `create_repository`, in call order.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn contains(&self, repository: &str) -> bool {
        self.state.lock().unwrap().repositories.contains(repository)
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }
}

#[async_trait]
impl RegistryAdmin for MemoryRegistry {
    async fn repository_exists(&self, repository: &str) -> CapabilityResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        if state.unavailable {
            return Err(scripted("registry unavailable"));
        }
        Ok(state.repositories.contains(repository))
    }

    async fn create_repository(&self, repository: &str) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(scripted("registry unavailable"));
        }
        if state.repositories.insert(repository.to_string()) {
            state.created.push(repository.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryGitOpsRepo
// ---------------------------------------------------------------------------

type ImageKey = (PathBuf, String);
type Tree = BTreeMap<ImageKey, String>;

const ROOT_COMMIT: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone)]
struct MemoryCommit {
    id: String,
    message: String,
    tree: Tree,
}

#[derive(Debug, Default)]
struct RepoState {
    working: Tree,
    /// Tree of the seed commit the clone started from.
    root: Tree,
    /// Local branch history after the seed commit, oldest first.
    local: Vec<MemoryCommit>,
    /// How many of `local` the remote branch has received.
    pushed: usize,
    next_id: u64,
    ops: Vec<String>,
    remote_diverged: bool,
    reject_push: bool,
    fail_set_image: BTreeSet<String>,
}

impl RepoState {
    fn committed(&self) -> &Tree {
        self.local.last().map_or(&self.root, |c| &c.tree)
    }

    fn head(&self) -> String {
        self.local
            .last()
            .map_or_else(|| ROOT_COMMIT.to_string(), |c| c.id.clone())
    }
}

/// Working tree, local branch and remote that is both the
/// [`VersionControl`] and the [`ManifestEditor`] of a test run.
///
/// Manifests are modeled as `(directory, image name) → reference`. A path
/// has changes when its working entries differ from the local HEAD. Local
/// commits reach the remote only through `push`.
#[derive(Debug, Default)]
pub struct MemoryGitOpsRepo {
    state: Mutex<RepoState>,
}

impl MemoryGitOpsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a manifest entry that is already committed and pushed.
    pub fn with_committed_image(self, dir: &str, image_name: &str, image: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let key = (PathBuf::from(dir), image_name.to_string());
            state.root.insert(key.clone(), image.to_string());
            state.working.insert(key, image.to_string());
        }
        self
    }

    /// Simulate another writer having advanced the remote branch.
    pub fn with_diverged_remote(self) -> Self {
        self.state.lock().unwrap().remote_diverged = true;
        self
    }

    /// Let the pull succeed but reject the push as non-fast-forward.
    pub fn with_rejected_push(self) -> Self {
        self.state.lock().unwrap().reject_push = true;
        self
    }

    pub fn fail_set_image_for(self, image_name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_set_image
            .insert(image_name.to_string());
        self
    }

    /// Operation log, e.g. `["set_image alpha", "commit", "pull", "push"]`.
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Messages of the commits on the local branch.
    pub fn commits(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.local.iter().map(|c| c.message.clone()).collect()
    }

    /// Messages of the commits the remote branch has received.
    pub fn pushed_commits(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.local[..state.pushed]
            .iter()
            .map(|c| c.message.clone())
            .collect()
    }

    /// Local commits the remote does not have.
    pub fn unpushed_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.local.len() - state.pushed
    }

    pub fn working_image(&self, dir: &str, image_name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .working
            .get(&(PathBuf::from(dir), image_name.to_string()))
            .cloned()
    }

    /// Entry at the local HEAD.
    pub fn committed_image(&self, dir: &str, image_name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .committed()
            .get(&(PathBuf::from(dir), image_name.to_string()))
            .cloned()
    }
}

fn entries_under<'a>(
    map: &'a Tree,
    path: &'a Path,
) -> impl Iterator<Item = (&'a ImageKey, &'a String)> + 'a {
    map.iter().filter(move |((dir, _), _)| dir.starts_with(path))
}

fn replace_under(target: &mut Tree, source: &Tree, path: &Path) {
    let entries: Vec<(ImageKey, String)> = entries_under(source, path)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    target.retain(|(dir, _), _| !dir.starts_with(path));
    target.extend(entries);
}

#[async_trait]
impl VersionControl for MemoryGitOpsRepo {
    async fn has_changes(&self, path: &Path) -> CapabilityResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("status".to_string());
        let working: Vec<_> = entries_under(&state.working, path).collect();
        let committed: Vec<_> = entries_under(state.committed(), path).collect();
        Ok(working != committed)
    }

    async fn head(&self) -> CapabilityResult<String> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("head".to_string());
        Ok(state.head())
    }

    async fn commit(&self, path: &Path, message: &str) -> CapabilityResult<String> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("commit".to_string());
        let mut tree = state.committed().clone();
        replace_under(&mut tree, &state.working, path);
        state.next_id += 1;
        let id = format!("{:040x}", state.next_id);
        state.local.push(MemoryCommit {
            id: id.clone(),
            message: message.to_string(),
            tree,
        });
        Ok(id)
    }

    async fn pull_fast_forward(&self, remote: &str, branch: &str) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("pull".to_string());
        if state.remote_diverged {
            return Err(CapabilityError::Diverged(format!(
                "{remote}/{branch} has commits not in the local branch"
            )));
        }
        Ok(())
    }

    async fn push(&self, remote: &str, branch: &str) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("push".to_string());
        if state.reject_push || state.remote_diverged {
            return Err(CapabilityError::Diverged(format!(
                "push to {remote}/{branch} rejected (non-fast-forward)"
            )));
        }
        state.pushed = state.local.len();
        Ok(())
    }

    async fn reset_to(&self, commit: &str) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("reset".to_string());
        let keep = if commit == ROOT_COMMIT {
            0
        } else {
            state
                .local
                .iter()
                .position(|c| c.id == commit)
                .map(|index| index + 1)
                .ok_or_else(|| scripted("unknown commit"))?
        };
        if keep < state.pushed {
            return Err(scripted("cannot reset below the pushed commit"));
        }
        state.local.truncate(keep);
        let head = state.committed().clone();
        state.working = head;
        Ok(())
    }

    async fn restore(&self, path: &Path) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push("restore".to_string());
        let committed = state.committed().clone();
        replace_under(&mut state.working, &committed, path);
        Ok(())
    }
}

#[async_trait]
impl ManifestEditor for MemoryGitOpsRepo {
    async fn set_image(
        &self,
        manifest_dir: &Path,
        image_name: &str,
        image: &ImageReference,
    ) -> CapabilityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(format!("set_image {image_name}"));
        if state.fail_set_image.contains(image_name) {
            return Err(scripted("scripted edit failure"));
        }
        state.working.insert(
            (manifest_dir.to_path_buf(), image_name.to_string()),
            image.to_string(),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMirror
// ---------------------------------------------------------------------------

/// Mirror that counts invocations.
#[derive(Debug)]
pub struct MemoryMirror {
    target: String,
    calls: Mutex<usize>,
    failure: Option<String>,
}

impl MemoryMirror {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            calls: Mutex::new(0),
            failure: None,
        }
    }

    pub fn failing(target: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(target)
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RepositoryMirror for MemoryMirror {
    async fn mirror(&self) -> CapabilityResult<()> {
        *self.calls.lock().unwrap() += 1;
        match &self.failure {
            Some(message) => Err(scripted(message)),
            None => Ok(()),
        }
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notification sink that keeps every delivered notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    attempts: Mutex<usize>,
    failure: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Successfully delivered notifications.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivery attempts, successful or not.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> CapabilityResult<()> {
        *self.attempts.lock().unwrap() += 1;
        if let Some(message) = &self.failure {
            return Err(CapabilityError::Http(message.clone()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
