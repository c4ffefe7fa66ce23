//! Retry/update loop over push attempts.
//!
//! A run pushes every planned repository, and when some of them are
//! rejected because the remote moved ahead, brings them up to date (merge
//! or rebase) and pushes the remaining ones again. Errors, custom
//! rejections and unclean updates end the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PushSettings, UpdateMethod};
use crate::error::PushResult;
use crate::metrics::METRICS;
use crate::obs::{
    emit_attempt_finished, emit_push_finished, emit_push_started, emit_update_finished, PushSpan,
};
use crate::push::collaborators::{
    AcceptDefaults, NoSettingsStore, Progress, PushListener, RepositoryState, SettingsStore,
    TracingListener, UpdateMethodDecider, UpdatePrompt, Updater,
};
use crate::push::executor::{fill_not_pushed, PushAttemptExecutor};
use crate::push::grouping::GroupedOutcomes;
use crate::push::outcome::{RepoOutcome, RepoOutcomeKind, UpdateOutcome};
use crate::push::result::{HashRange, HistoryLabel, RunResult};
use crate::push::spec::{PushOptions, PushPlan, RepoId};

/// Upper bound on push attempts in one run.
pub const MAX_PUSH_ATTEMPTS: usize = 10;

pub const BEFORE_UPDATE_LABEL: &str = "Before update";
pub const AFTER_UPDATE_LABEL: &str = "After update";

/// Loop phase, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Attempting,
    Deciding,
    PromptingForUpdateMethod,
    Updating,
    Done,
}

impl PushState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attempting => "attempting",
            Self::Deciding => "deciding",
            Self::PromptingForUpdateMethod => "prompting_for_update_method",
            Self::Updating => "updating",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State accumulated over the attempts of one run.
#[derive(Debug, Default)]
struct Accumulator {
    outcomes: BTreeMap<RepoId, RepoOutcome>,
    updated_files: Vec<PathBuf>,
    before_update_label: Option<HistoryLabel>,
    /// `HEAD` of each updated repository before its first update.
    positions: BTreeMap<RepoId, String>,
    /// Last update result of each repository rejected during the run.
    updates: BTreeMap<RepoId, UpdateOutcome>,
    attempts: usize,
}

impl Accumulator {
    /// Merge one attempt's outcomes over the previous ones.
    ///
    /// A repository that was updated earlier keeps its update result across
    /// later attempts.
    fn fold(&mut self, delta: BTreeMap<RepoId, RepoOutcome>) {
        for (repo, outcome) in delta {
            let outcome = match self.updates.get(&repo) {
                Some(update) => outcome.with_update(*update),
                None => outcome,
            };
            self.outcomes.insert(repo, outcome);
        }
    }

    /// Attach an update result to the rejected repositories.
    fn record_update(&mut self, rejected: &[RepoId], update: UpdateOutcome) {
        for repo in rejected {
            self.updates.insert(repo.clone(), update);
            if let Some(existing) = self.outcomes.remove(repo) {
                self.outcomes.insert(repo.clone(), existing.with_update(update));
            }
        }
    }

    /// Repositories worth another attempt.
    fn remaining(&self, order: &[RepoId]) -> Vec<RepoId> {
        order
            .iter()
            .filter(|repo| {
                self.outcomes.get(*repo).is_some_and(|o| {
                    matches!(
                        o.kind,
                        RepoOutcomeKind::RejectedNoFastForward | RepoOutcomeKind::NotPushed
                    )
                })
            })
            .cloned()
            .collect()
    }
}

/// Drives push attempts, updates and retries for a [`PushPlan`].
pub struct PushOrchestrator {
    plan: PushPlan,
    options: PushOptions,
    executor: Arc<dyn PushAttemptExecutor>,
    state: Arc<dyn RepositoryState>,
    updater: Arc<dyn Updater>,
    decider: Arc<dyn UpdateMethodDecider>,
    settings_store: Arc<dyn SettingsStore>,
    listener: Arc<dyn PushListener>,
    settings: PushSettings,
    progress: Progress,
}

impl PushOrchestrator {
    pub fn new(
        plan: PushPlan,
        options: PushOptions,
        executor: Arc<dyn PushAttemptExecutor>,
        state: Arc<dyn RepositoryState>,
        updater: Arc<dyn Updater>,
    ) -> Self {
        Self {
            plan,
            options,
            executor,
            state,
            updater,
            decider: Arc::new(AcceptDefaults),
            settings_store: Arc::new(NoSettingsStore),
            listener: Arc::new(TracingListener),
            settings: PushSettings::default(),
            progress: Progress::new(),
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn UpdateMethodDecider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = store;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn PushListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_settings(mut self, settings: PushSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Handle for cancelling the run from another task.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Push every planned repository, updating and retrying rejected ones.
    ///
    /// Repository state is refreshed at exit whatever the outcome. An
    /// unsupported native outcome is returned as an error after that refresh.
    pub async fn run(&self) -> PushResult<RunResult> {
        let run_id = Uuid::new_v4().to_string();
        let _span = PushSpan::enter(&run_id);
        let started = Instant::now();
        let order = self.plan.order();
        emit_push_started(&run_id, order.len(), self.options.force_mode.is_active());

        let mut acc = Accumulator::default();
        let looped = self.run_attempts(&order, &mut acc).await;

        for repo in &order {
            self.state.refresh(repo).await;
        }
        looped?;

        let after_update_label = acc
            .before_update_label
            .as_ref()
            .map(|_| HistoryLabel::now(AFTER_UPDATE_LABEL));
        let updated_ranges = self.updated_ranges(&acc.positions).await;
        let outcomes = fill_not_pushed(&self.plan, &order, std::mem::take(&mut acc.outcomes));

        for repo in &order {
            if let Some(outcome) = outcomes.get(repo) {
                self.listener.on_repo_outcome(repo, outcome);
            }
        }

        let result = RunResult {
            outcomes,
            updated_files: acc.updated_files,
            before_update_label: acc.before_update_label,
            after_update_label,
            updated_ranges,
        };
        emit_push_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            acc.attempts,
            result.is_success(),
        );
        METRICS.flush();
        Ok(result)
    }

    async fn run_attempts(&self, order: &[RepoId], acc: &mut Accumulator) -> PushResult<()> {
        let mut settings = self.settings;
        let mut remaining = order.to_vec();
        let mut state = PushState::Attempting;

        for attempt in 0..MAX_PUSH_ATTEMPTS {
            if remaining.is_empty() {
                break;
            }
            if self.progress.is_cancelled() {
                info!(attempt, "push cancelled");
                break;
            }

            transition(&mut state, PushState::Attempting, attempt);
            METRICS.inc_attempts();
            acc.attempts += 1;
            let delta = self.executor.push(&remaining, &self.progress).await?;
            let delta = fill_not_pushed(&self.plan, &remaining, delta);
            let grouped = GroupedOutcomes::group(&delta);
            emit_attempt_finished(
                attempt,
                grouped.successful.len(),
                grouped.rejected.len() + grouped.custom_rejected.len(),
                grouped.errors.len(),
            );
            METRICS.add_rejections((grouped.rejected.len() + grouped.custom_rejected.len()) as u64);
            METRICS.add_errors(grouped.errors.len() as u64);
            acc.fold(delta);

            transition(&mut state, PushState::Deciding, attempt);
            if grouped.has_terminal() {
                debug!(
                    errors = grouped.errors.len(),
                    custom_rejected = grouped.custom_rejected.len(),
                    "terminal push results"
                );
                break;
            }

            if !grouped.rejected.is_empty() {
                let rejected: Vec<RepoId> = grouped.rejected.keys().cloned().collect();
                if let Some(reason) = self.update_blocker(&rejected).await {
                    info!(reason = %reason, "not updating rejected repositories");
                    break;
                }

                if attempt == 0 && !settings.auto_update_on_rejection {
                    transition(&mut state, PushState::PromptingForUpdateMethod, attempt);
                    match self.prompt_for_update_method(&rejected, settings).await {
                        Some(chosen) => settings = chosen,
                        None => {
                            info!("update method prompt cancelled");
                            break;
                        }
                    }
                }

                transition(&mut state, PushState::Updating, attempt);
                if acc.before_update_label.is_none() {
                    acc.before_update_label = Some(HistoryLabel::now(BEFORE_UPDATE_LABEL));
                }
                let roots = self.roots_to_update(&rejected, settings.update_all_roots).await;
                for root in &roots {
                    if acc.positions.contains_key(root) {
                        continue;
                    }
                    if let Ok(Some(head)) = self.state.head_position(root).await {
                        acc.positions.insert(root.clone(), head);
                    }
                }

                let outcome = self.update(&roots, settings.update_method, acc).await;
                acc.record_update(&rejected, outcome);
                if !outcome.allows_retry() {
                    info!(outcome = outcome.as_str(), "update did not finish cleanly");
                    break;
                }
            }

            remaining = acc.remaining(order);
        }

        transition(&mut state, PushState::Done, acc.attempts);
        Ok(())
    }

    /// Why rejected repositories must not be updated automatically, if at all.
    ///
    /// Updating only makes sense when each rejected repository pushes its
    /// checked-out branch to the branch that branch tracks.
    async fn update_blocker(&self, rejected: &[RepoId]) -> Option<String> {
        if self.options.force_mode.is_active() {
            return Some("force push".to_string());
        }
        for repo in rejected {
            let Some(spec) = self.plan.spec(repo) else {
                continue;
            };
            let current = match self.state.current_branch(repo).await {
                Ok(Some(branch)) => branch,
                Ok(None) => return Some(format!("{repo}: detached HEAD")),
                Err(e) => return Some(format!("{repo}: {e}")),
            };
            if spec.source.branch_name() != Some(current.as_str()) {
                return Some(format!("{repo}: source is not the current branch {current}"));
            }
            match self.state.tracking_info(repo, &current).await {
                Ok(Some(info)) if info.matches(&spec.target) => {}
                Ok(_) => {
                    return Some(format!(
                        "{repo}: {current} does not track {}/{}",
                        spec.target.remote, spec.target.branch
                    ))
                }
                Err(e) => return Some(format!("{repo}: {e}")),
            }
        }
        None
    }

    /// Ask once for the update method; `None` when the prompt was cancelled.
    async fn prompt_for_update_method(
        &self,
        rejected: &[RepoId],
        settings: PushSettings,
    ) -> Option<PushSettings> {
        let mut defaults = settings.update_settings();
        let problem = defaults.method == UpdateMethod::Rebase
            && self.updater.has_rebase_over_merge_problem(rejected).await;
        if problem {
            warn!("rebase would rewrite local merge commits, offering merge");
            defaults.method = UpdateMethod::Merge;
        }

        let prompt = UpdatePrompt {
            rejected: rejected.to_vec(),
            defaults,
            rebase_over_merge_problem: problem,
            confirm_enabled: !problem,
        };
        let chosen = self.decider.choose(&prompt).await?;

        if !problem {
            if let Err(e) = self.settings_store.save_update_settings(&chosen) {
                warn!(error = %e, "could not save update settings");
            }
        }
        Some(settings.with_update_settings(chosen))
    }

    /// Rejected repositories, plus every tracked one when updating all roots.
    async fn roots_to_update(&self, rejected: &[RepoId], update_all_roots: bool) -> Vec<RepoId> {
        let mut roots: BTreeSet<RepoId> = rejected.iter().cloned().collect();
        if update_all_roots {
            roots.extend(self.state.tracked_repositories().await);
        }
        roots.into_iter().collect()
    }

    async fn update(
        &self,
        roots: &[RepoId],
        method: UpdateMethod,
        acc: &mut Accumulator,
    ) -> UpdateOutcome {
        METRICS.inc_updates();
        self.progress.set_text(format!("updating {} repositories", roots.len()));
        let check_rebase_over_merge = method == UpdateMethod::Rebase;
        let outcome = match self
            .updater
            .update(roots, method, check_rebase_over_merge, &self.progress)
            .await
        {
            Ok(report) => {
                acc.updated_files.extend(report.updated_files);
                report.outcome
            }
            Err(e) => {
                warn!(error = %e, "update failed");
                UpdateOutcome::Failure
            }
        };
        for root in roots {
            self.state.refresh(root).await;
        }
        emit_update_finished(method.as_str(), outcome.as_str(), roots.len());
        outcome
    }

    async fn updated_ranges(
        &self,
        positions: &BTreeMap<RepoId, String>,
    ) -> BTreeMap<RepoId, HashRange> {
        let mut ranges = BTreeMap::new();
        for (repo, before) in positions {
            match self.state.head_position(repo).await {
                Ok(Some(after)) if &after != before => {
                    ranges.insert(repo.clone(), HashRange::new(before.clone(), after));
                }
                Ok(_) => {}
                Err(e) => warn!(repo = %repo, error = %e, "could not read HEAD after update"),
            }
        }
        ranges
    }
}

fn transition(current: &mut PushState, next: PushState, attempt: usize) {
    debug!(from = %current, to = %next, attempt, "push state");
    *current = next;
}
