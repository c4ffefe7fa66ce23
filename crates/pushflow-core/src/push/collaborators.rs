//! Injectable collaborators of the push engine.
//!
//! Implement these traits to plug in a real version-control client, a UI, or
//! test stubs. [`crate::git`] provides git command-line implementations and
//! [`crate::push::fakes`] in-memory ones.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{UpdateMethod, UpdateSettings};
use crate::error::PushResult;
use crate::push::lease::ForceLeaseToken;
use crate::push::outcome::{RepoOutcome, UpdateOutcome};
use crate::push::spec::{PushTarget, RepoId, TagMode, REFS_HEADS};

/// Cooperative cancellation flag plus a status line, shared with collaborators.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    cancelled: Arc<AtomicBool>,
    text: Arc<Mutex<String>>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_text(&self, text: impl Into<String>) {
        if let Ok(mut guard) = self.text.lock() {
            *guard = text.into();
        }
    }

    pub fn text(&self) -> String {
        self.text.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Everything needed to run one `git push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushParams {
    pub remote: String,
    pub refspec: String,
    pub force: bool,
    pub force_with_lease: Option<ForceLeaseToken>,
    pub set_upstream: bool,
    pub skip_hooks: bool,
    pub tag_mode: Option<TagMode>,
}

impl PushParams {
    /// Command-line arguments for `git`, starting with the `push` subcommand.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["push".to_string(), "--porcelain".to_string()];
        if self.force {
            args.push("--force".to_string());
        }
        if let Some(lease) = &self.force_with_lease {
            args.push(format!("--force-with-lease={}", lease.to_param()));
        }
        if self.set_upstream {
            args.push("--set-upstream".to_string());
        }
        if self.skip_hooks {
            args.push("--no-verify".to_string());
        }
        if let Some(mode) = self.tag_mode {
            args.push(mode.argument().to_string());
        }
        args.push(self.remote.clone());
        args.push(self.refspec.clone());
        args
    }
}

/// Captured result of one push invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOutput {
    pub success: bool,
    pub output_lines: Vec<String>,
    pub error_text: String,
}

impl TransportOutput {
    pub fn ok(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            success: true,
            output_lines: lines.into_iter().map(Into::into).collect(),
            error_text: String::new(),
        }
    }

    pub fn failed(lines: impl IntoIterator<Item = impl Into<String>>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_lines: lines.into_iter().map(Into::into).collect(),
            error_text: error.into(),
        }
    }
}

/// The remote branch a local branch tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub remote: String,
    /// Remote branch short name (`main`).
    pub remote_branch: String,
}

impl TrackInfo {
    pub fn new(remote: impl Into<String>, remote_branch: impl Into<String>) -> Self {
        let remote_branch = remote_branch.into();
        let remote_branch = remote_branch
            .strip_prefix(REFS_HEADS)
            .map(str::to_string)
            .unwrap_or(remote_branch);
        Self {
            remote: remote.into(),
            remote_branch,
        }
    }

    pub fn matches(&self, target: &PushTarget) -> bool {
        !target.special_ref && self.remote == target.remote && self.remote_branch == target.branch
    }
}

/// Result of one update step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    pub updated_files: Vec<PathBuf>,
}

impl UpdateReport {
    pub fn new(outcome: UpdateOutcome) -> Self {
        Self {
            outcome,
            updated_files: Vec::new(),
        }
    }
}

/// What the update-method prompt is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrompt {
    pub rejected: Vec<RepoId>,
    pub defaults: UpdateSettings,
    pub rebase_over_merge_problem: bool,
    /// `false` when the confirming action must be shown disabled.
    pub confirm_enabled: bool,
}

/// Runs a single push command.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(
        &self,
        repo: &RepoId,
        params: &PushParams,
        progress: &Progress,
    ) -> PushResult<TransportOutput>;
}

/// Read access to locally synchronized repository state.
#[async_trait]
pub trait RepositoryState: Send + Sync {
    /// Short name of the checked-out branch; `None` when detached.
    async fn current_branch(&self, repo: &RepoId) -> PushResult<Option<String>>;

    async fn tracking_info(&self, repo: &RepoId, branch: &str) -> PushResult<Option<TrackInfo>>;

    /// Hash of the remote-tracking ref for `target`, if present locally.
    async fn remote_tracking_tip(
        &self,
        repo: &RepoId,
        target: &PushTarget,
    ) -> PushResult<Option<String>>;

    /// Current `HEAD` commit.
    async fn head_position(&self, repo: &RepoId) -> PushResult<Option<String>>;

    /// Number of commits in an `old..new` range.
    async fn count_commits(&self, repo: &RepoId, range: &str) -> PushResult<usize>;

    /// Every repository known to the caller, pushed or not.
    async fn tracked_repositories(&self) -> Vec<RepoId>;

    /// Re-read cached branch metadata after a mutation.
    async fn refresh(&self, repo: &RepoId);
}

/// The external merge/rebase step.
#[async_trait]
pub trait Updater: Send + Sync {
    async fn update(
        &self,
        repos: &[RepoId],
        method: UpdateMethod,
        check_rebase_over_merge: bool,
        progress: &Progress,
    ) -> PushResult<UpdateReport>;

    /// Whether rebasing would rewrite local merge commits.
    async fn has_rebase_over_merge_problem(&self, _repos: &[RepoId]) -> bool {
        false
    }
}

/// Asks the user how to update; `None` means cancelled.
#[async_trait]
pub trait UpdateMethodDecider: Send + Sync {
    async fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateSettings>;
}

/// Persists the chosen update settings.
pub trait SettingsStore: Send + Sync {
    fn save_update_settings(&self, settings: &UpdateSettings) -> PushResult<()>;
}

/// Receives one notification per repository per run.
pub trait PushListener: Send + Sync {
    fn on_repo_outcome(&self, repo: &RepoId, outcome: &RepoOutcome);
}

/// Listener that only logs.
#[derive(Debug, Default)]
pub struct TracingListener;

impl PushListener for TracingListener {
    fn on_repo_outcome(&self, repo: &RepoId, outcome: &RepoOutcome) {
        crate::obs::emit_repo_outcome(repo, outcome);
    }
}

/// Decider that always accepts the offered defaults.
#[derive(Debug, Default)]
pub struct AcceptDefaults;

#[async_trait]
impl UpdateMethodDecider for AcceptDefaults {
    async fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateSettings> {
        Some(prompt.defaults)
    }
}

/// Store that discards everything.
#[derive(Debug, Default)]
pub struct NoSettingsStore;

impl SettingsStore for NoSettingsStore {
    fn save_update_settings(&self, _settings: &UpdateSettings) -> PushResult<()> {
        Ok(())
    }
}
