//! One push attempt over a set of repositories.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::PushResult;
use crate::push::collaborators::{
    Progress, PushParams, PushTransport, RepositoryState, TransportOutput,
};
use crate::push::lease::force_lease_token;
use crate::push::native::{parse_push_output, NativeKind, NativeOutcome};
use crate::push::outcome::RepoOutcome;
use crate::push::spec::{ForceMode, PushOptions, PushPlan, PushSpec, RepoId};

/// Pushes the given repositories once, in the given order.
///
/// Implementations may leave repositories out of the returned map; the
/// orchestrator records those as not pushed.
#[async_trait]
pub trait PushAttemptExecutor: Send + Sync {
    async fn push(
        &self,
        repos: &[RepoId],
        progress: &Progress,
    ) -> PushResult<BTreeMap<RepoId, RepoOutcome>>;
}

/// Executor that drives a [`PushTransport`] and reads local state through a
/// [`RepositoryState`].
pub struct GitPushExecutor {
    plan: PushPlan,
    options: PushOptions,
    transport: Arc<dyn PushTransport>,
    state: Arc<dyn RepositoryState>,
}

impl GitPushExecutor {
    pub fn new(
        plan: PushPlan,
        options: PushOptions,
        transport: Arc<dyn PushTransport>,
        state: Arc<dyn RepositoryState>,
    ) -> Self {
        Self {
            plan,
            options,
            transport,
            state,
        }
    }

    /// Build the transport parameters for one repository.
    pub async fn params_for(&self, repo: &RepoId, spec: &PushSpec) -> PushParams {
        let set_upstream = self.needs_upstream(repo, spec).await;
        let force_with_lease = if self.options.force_mode == ForceMode::ForceWithLease {
            let tip = self
                .state
                .remote_tracking_tip(repo, &spec.target)
                .await
                .unwrap_or_else(|e| {
                    warn!(repo = %repo, error = %e, "could not read remote-tracking tip");
                    None
                });
            force_lease_token(&spec.target, tip.as_deref())
        } else {
            None
        };

        PushParams {
            remote: spec.target.remote.clone(),
            refspec: spec.refspec(set_upstream),
            force: self.options.force_mode == ForceMode::Force,
            force_with_lease,
            set_upstream,
            skip_hooks: self.options.skip_hooks,
            tag_mode: self.options.tag_mode,
        }
    }

    /// Upstream is set when creating a remote branch for a branch that
    /// does not track anything yet.
    async fn needs_upstream(&self, repo: &RepoId, spec: &PushSpec) -> bool {
        if !spec.target.new_branch {
            return false;
        }
        let Some(branch) = spec.source.branch_name() else {
            return false;
        };
        match self.state.tracking_info(repo, branch).await {
            Ok(info) => info.is_none(),
            Err(e) => {
                warn!(repo = %repo, branch, error = %e, "could not read tracking info");
                false
            }
        }
    }

    async fn push_repo(
        &self,
        repo: &RepoId,
        spec: &PushSpec,
        progress: &Progress,
    ) -> PushResult<Option<RepoOutcome>> {
        let params = self.params_for(repo, spec).await;
        progress.set_text(format!("pushing {} to {}", repo, spec.target.remote));

        let output = self
            .transport
            .push(repo, &params, progress)
            .await
            .unwrap_or_else(|e| {
                warn!(repo = %repo, error = %e, "push invocation failed");
                TransportOutput::failed(Vec::<String>::new(), e.to_string())
            });
        debug!(repo = %repo, success = output.success, lines = output.output_lines.len(), "push finished");

        let natives = parse_push_output(&output.output_lines);
        if natives.is_empty() && !output.success {
            return Ok(Some(RepoOutcome::error(spec, error_text(&output))));
        }

        let Some(primary) = primary_outcome(&natives, spec) else {
            error!(repo = %repo, results = ?natives, "no result for the pushed branch");
            return Ok(None);
        };
        let tags: Vec<NativeOutcome> = natives
            .iter()
            .filter(|n| {
                !std::ptr::eq(*n, primary)
                    && matches!(n.kind, NativeKind::NewRef | NativeKind::ForcedUpdate)
            })
            .cloned()
            .collect();

        let pushed_commits = if primary.kind == NativeKind::Success {
            self.pushed_commit_count(repo, primary).await
        } else {
            None
        };

        RepoOutcome::from_native(primary, &tags, pushed_commits, spec).map(Some)
    }

    /// Count pushed commits from the reported range; never trusts a missing
    /// or unresolvable range.
    async fn pushed_commit_count(&self, repo: &RepoId, primary: &NativeOutcome) -> Option<usize> {
        let Some(range) = primary.range.as_deref() else {
            error!(repo = %repo, summary = %primary.summary, "range of pushed commits not reported");
            return None;
        };
        match self.state.count_commits(repo, range).await {
            Ok(count) => Some(count),
            Err(e) => {
                error!(repo = %repo, range, error = %e, "could not count pushed commits");
                None
            }
        }
    }
}

#[async_trait]
impl PushAttemptExecutor for GitPushExecutor {
    async fn push(
        &self,
        repos: &[RepoId],
        progress: &Progress,
    ) -> PushResult<BTreeMap<RepoId, RepoOutcome>> {
        let mut results = BTreeMap::new();
        for repo in repos {
            let Some(spec) = self.plan.spec(repo) else {
                warn!(repo = %repo, "no push spec for repository");
                continue;
            };
            if let Some(outcome) = self.push_repo(repo, spec, progress).await? {
                results.insert(repo.clone(), outcome);
            }
        }
        Ok(fill_not_pushed(&self.plan, repos, results))
    }
}

/// Record every repository of `repos` missing from `results` as not pushed.
pub fn fill_not_pushed(
    plan: &PushPlan,
    repos: &[RepoId],
    mut results: BTreeMap<RepoId, RepoOutcome>,
) -> BTreeMap<RepoId, RepoOutcome> {
    for repo in repos {
        if results.contains_key(repo) {
            continue;
        }
        if let Some(spec) = plan.spec(repo) {
            results.insert(repo.clone(), RepoOutcome::not_pushed(spec));
        }
    }
    results
}

/// Pick the line describing the requested branch or commit.
///
/// An exact match on the requested revision wins; otherwise the first line
/// whose source looks like a branch, a hash or `HEAD`. With a single-ref push
/// there is one such line; if a remote reports several, the first is used.
pub fn primary_outcome<'a>(
    natives: &'a [NativeOutcome],
    spec: &PushSpec,
) -> Option<&'a NativeOutcome> {
    let requested = spec.source.revision();
    if let Some(exact) = natives.iter().find(|n| n.source_ref == requested) {
        return Some(exact);
    }
    let mut candidates = natives.iter().filter(|n| n.is_branch_candidate());
    let first = candidates.next()?;
    if candidates.next().is_some() {
        warn!(requested = %requested, chosen = %first.source_ref, "several branch results reported");
    }
    Some(first)
}

fn error_text(output: &TransportOutput) -> String {
    if output.error_text.trim().is_empty() {
        output.output_lines.join("\n")
    } else {
        output.error_text.clone()
    }
}
