//! Structured observability hooks for push runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `PushSpan` RAII guard
//! - Emission functions for lifecycle events: start, attempt, update, per-repository outcome, finish
//!
//! Events are emitted at `info!` level; filter them with `RUST_LOG`.

use tracing::info;

use crate::push::outcome::RepoOutcome;
use crate::push::spec::RepoId;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = PushSpan::enter("0b6c...");
/// // every event inside the run now carries run_id
/// ```
pub struct PushSpan {
    _span: tracing::span::EnteredSpan,
}

impl PushSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("pushflow.push", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: push run started.
pub fn emit_push_started(run_id: &str, repositories: usize, force: bool) {
    info!(
        event = "push.started",
        run_id = %run_id,
        repositories = repositories,
        force = force,
    );
}

/// Emit event: one push attempt finished, with bucket sizes.
pub fn emit_attempt_finished(attempt: usize, successful: usize, rejected: usize, errors: usize) {
    info!(
        event = "push.attempt_finished",
        attempt = attempt,
        successful = successful,
        rejected = rejected,
        errors = errors,
    );
}

/// Emit event: update step finished.
pub fn emit_update_finished(method: &str, outcome: &str, repositories: usize) {
    info!(
        event = "push.update_finished",
        method = %method,
        outcome = %outcome,
        repositories = repositories,
    );
}

/// Emit event: final outcome of one repository.
pub fn emit_repo_outcome(repo: &RepoId, outcome: &RepoOutcome) {
    info!(
        event = "push.repo_outcome",
        repo = %repo,
        kind = outcome.kind.as_str(),
        source = %outcome.source_branch,
        target = %outcome.target_branch,
        remote = %outcome.target_remote,
        pushed_commits = ?outcome.pushed_commits,
        update = ?outcome.update_outcome.map(|u| u.as_str()),
        error = ?outcome.error,
    );
}

/// Emit event: push run finished.
pub fn emit_push_finished(run_id: &str, duration_ms: u64, attempts: usize, success: bool) {
    info!(
        event = "push.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        attempts = attempts,
        success = success,
    );
}
