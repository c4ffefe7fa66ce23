//! Git command-line collaborators.
//!
//! [`GitCli`] pushes and reads repository state by running `git`;
//! [`GitUpdater`] brings rejected branches up to date with `git pull`.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::UpdateMethod;
use crate::error::{PushError, PushResult};
use crate::push::collaborators::{
    Progress, PushParams, PushTransport, RepositoryState, TrackInfo, TransportOutput,
    UpdateReport, Updater,
};
use crate::push::outcome::UpdateOutcome;
use crate::push::spec::{PushTarget, RepoId};

/// Run `git` in `dir` without ever prompting for credentials.
async fn run_git(dir: &Path, args: &[&str]) -> PushResult<Output> {
    debug!(dir = %dir.display(), ?args, "git");
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PushError::Git(format!("failed to run git: {e}")))
}

/// Trimmed stdout of a command that must succeed.
async fn git_stdout(dir: &Path, args: &[&str]) -> PushResult<String> {
    let output = run_git(dir, args).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PushError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Trimmed stdout, or `None` when the command fails or prints nothing.
async fn git_optional(dir: &Path, args: &[&str]) -> PushResult<Option<String>> {
    let output = run_git(dir, args).await?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((output.status.success() && !stdout.is_empty()).then_some(stdout))
}

/// Transport and repository state backed by the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    repos: Vec<RepoId>,
}

impl GitCli {
    /// `repos` are the repositories reported by
    /// [`RepositoryState::tracked_repositories`].
    pub fn new(repos: Vec<RepoId>) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl PushTransport for GitCli {
    async fn push(
        &self,
        repo: &RepoId,
        params: &PushParams,
        progress: &Progress,
    ) -> PushResult<TransportOutput> {
        if progress.is_cancelled() {
            return Err(PushError::Transport {
                repo: repo.to_string(),
                detail: "cancelled".to_string(),
            });
        }
        let args = params.to_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = run_git(repo.path(), &args).await.map_err(|e| PushError::Transport {
            repo: repo.to_string(),
            detail: e.to_string(),
        })?;

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok(if output.status.success() {
            TransportOutput::ok(lines)
        } else {
            TransportOutput::failed(lines, stderr)
        })
    }
}

#[async_trait]
impl RepositoryState for GitCli {
    async fn current_branch(&self, repo: &RepoId) -> PushResult<Option<String>> {
        git_optional(repo.path(), &["symbolic-ref", "--quiet", "--short", "HEAD"]).await
    }

    async fn tracking_info(&self, repo: &RepoId, branch: &str) -> PushResult<Option<TrackInfo>> {
        let remote_key = format!("branch.{branch}.remote");
        let merge_key = format!("branch.{branch}.merge");
        let remote = git_optional(repo.path(), &["config", "--get", &remote_key]).await?;
        let merge = git_optional(repo.path(), &["config", "--get", &merge_key]).await?;
        Ok(remote.zip(merge).map(|(r, m)| TrackInfo::new(r, m)))
    }

    async fn remote_tracking_tip(
        &self,
        repo: &RepoId,
        target: &PushTarget,
    ) -> PushResult<Option<String>> {
        let tracking_ref = target.tracking_ref();
        git_optional(
            repo.path(),
            &["for-each-ref", "--format=%(objectname)", &tracking_ref],
        )
        .await
    }

    async fn head_position(&self, repo: &RepoId) -> PushResult<Option<String>> {
        git_optional(repo.path(), &["rev-parse", "--verify", "--quiet", "HEAD"]).await
    }

    async fn count_commits(&self, repo: &RepoId, range: &str) -> PushResult<usize> {
        let count = git_stdout(repo.path(), &["rev-list", "--count", range]).await?;
        count
            .parse()
            .map_err(|e| PushError::Git(format!("unexpected rev-list output {count:?}: {e}")))
    }

    async fn tracked_repositories(&self) -> Vec<RepoId> {
        self.repos.clone()
    }

    async fn refresh(&self, repo: &RepoId) {
        if let Err(e) = run_git(repo.path(), &["update-index", "-q", "--refresh"]).await {
            debug!(repo = %repo, error = %e, "index refresh failed");
        }
    }
}

/// Updater running `git pull` with merge or rebase.
#[derive(Debug, Clone, Default)]
pub struct GitUpdater;

impl GitUpdater {
    pub fn new() -> Self {
        Self
    }

    async fn has_local_merges(repo: &Path) -> PushResult<bool> {
        let count = git_optional(repo, &["rev-list", "--merges", "--count", "@{upstream}..HEAD"])
            .await?
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn update_repo(
        &self,
        repo: &Path,
        method: UpdateMethod,
        check_rebase_over_merge: bool,
        files: &mut Vec<PathBuf>,
    ) -> PushResult<UpdateOutcome> {
        let before = git_optional(repo, &["rev-parse", "--verify", "--quiet", "HEAD"]).await?;

        let keep_merges = method == UpdateMethod::Rebase
            && check_rebase_over_merge
            && Self::has_local_merges(repo).await?;
        let mode = match method {
            UpdateMethod::Merge => "--no-rebase",
            UpdateMethod::Rebase if keep_merges => {
                warn!(repo = %repo.display(), "keeping local merge commits while rebasing");
                "--rebase=merges"
            }
            UpdateMethod::Rebase => "--rebase",
        };
        let output = run_git(repo, &["pull", "--no-edit", mode]).await?;

        if !output.status.success() {
            let conflicts =
                git_optional(repo, &["diff", "--name-only", "--diff-filter=U"]).await?;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(if conflicts.is_some() {
                warn!(repo = %repo.display(), "update stopped on conflicts");
                UpdateOutcome::Incomplete
            } else {
                warn!(repo = %repo.display(), error = %stderr.trim(), "update failed");
                UpdateOutcome::Failure
            });
        }

        let after = git_optional(repo, &["rev-parse", "--verify", "--quiet", "HEAD"]).await?;
        match (before, after) {
            (Some(before), Some(after)) if before == after => Ok(UpdateOutcome::NothingToUpdate),
            (Some(before), Some(after)) => {
                let range = format!("{before}..{after}");
                let changed = git_stdout(repo, &["diff", "--name-only", &range]).await?;
                files.extend(changed.lines().map(|f| repo.join(f)));
                Ok(UpdateOutcome::CleanSuccess)
            }
            _ => Ok(UpdateOutcome::CleanSuccess),
        }
    }
}

#[async_trait]
impl Updater for GitUpdater {
    async fn update(
        &self,
        repos: &[RepoId],
        method: UpdateMethod,
        check_rebase_over_merge: bool,
        progress: &Progress,
    ) -> PushResult<UpdateReport> {
        let mut files = Vec::new();
        let mut updated = false;
        for repo in repos {
            if progress.is_cancelled() {
                return Ok(UpdateReport {
                    outcome: UpdateOutcome::Cancelled,
                    updated_files: files,
                });
            }
            progress.set_text(format!("updating {repo}"));
            match self
                .update_repo(repo.path(), method, check_rebase_over_merge, &mut files)
                .await?
            {
                UpdateOutcome::CleanSuccess => updated = true,
                UpdateOutcome::NothingToUpdate => {}
                other => {
                    return Ok(UpdateReport {
                        outcome: other,
                        updated_files: files,
                    })
                }
            }
        }
        Ok(UpdateReport {
            outcome: if updated {
                UpdateOutcome::CleanSuccess
            } else {
                UpdateOutcome::NothingToUpdate
            },
            updated_files: files,
        })
    }

    async fn has_rebase_over_merge_problem(&self, repos: &[RepoId]) -> bool {
        for repo in repos {
            match Self::has_local_merges(repo.path()).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(repo = %repo, error = %e, "could not look for merge commits"),
            }
        }
        false
    }
}
