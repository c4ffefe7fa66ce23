//! Aggregated result of a push run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::push::outcome::{RepoOutcome, RepoOutcomeKind};
use crate::push::spec::RepoId;

/// A `start..end` pair of commit positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRange {
    pub start: String,
    pub end: String,
}

impl HashRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl std::fmt::Display for HashRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Timestamped marker placed around the update step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLabel {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryLabel {
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Final result of [`PushOrchestrator::run`](crate::push::PushOrchestrator::run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// One entry per planned repository.
    pub outcomes: BTreeMap<RepoId, RepoOutcome>,
    /// Files touched by update steps.
    pub updated_files: Vec<PathBuf>,
    pub before_update_label: Option<HistoryLabel>,
    pub after_update_label: Option<HistoryLabel>,
    /// `HEAD` movement of each repository during the run, when it moved.
    pub updated_ranges: BTreeMap<RepoId, HashRange>,
}

impl RunResult {
    /// Every repository reached the remote or already was up to date.
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(|o| o.kind.is_pushed())
    }

    pub fn count(&self, kind: RepoOutcomeKind) -> usize {
        self.outcomes.values().filter(|o| o.kind == kind).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.kind.is_rejection()).count()
    }

    /// Total commits known to have been pushed.
    pub fn pushed_commits(&self) -> usize {
        self.outcomes.values().filter_map(|o| o.pushed_commits).sum()
    }

    /// Whether an update step ran during the run.
    pub fn was_updated(&self) -> bool {
        self.before_update_label.is_some()
    }

    /// Human-readable, one line per repository.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (repo, outcome) in &self.outcomes {
            let _ = write!(
                out,
                "{}: {} -> {}/{}",
                repo, outcome.source_branch, outcome.target_remote, outcome.target_branch
            );
            let _ = write!(out, " {}", describe(outcome));
            if !outcome.pushed_tags.is_empty() {
                let _ = write!(out, " (tags: {})", outcome.pushed_tags.join(", "));
            }
            if let Some(update) = outcome.update_outcome {
                let _ = write!(out, " [update: {}]", update.as_str());
            }
            if let Some(range) = self.updated_ranges.get(repo) {
                let _ = write!(out, " [updated {range}]");
            }
            out.push('\n');
        }
        if !self.updated_files.is_empty() {
            let _ = writeln!(out, "{} file(s) updated", self.updated_files.len());
        }
        out
    }
}

fn describe(outcome: &RepoOutcome) -> String {
    match outcome.kind {
        RepoOutcomeKind::Success => match outcome.pushed_commits {
            Some(1) => "pushed 1 commit".to_string(),
            Some(n) => format!("pushed {n} commits"),
            None => "pushed".to_string(),
        },
        RepoOutcomeKind::NewBranch => "pushed new branch".to_string(),
        RepoOutcomeKind::UpToDate => "everything up to date".to_string(),
        RepoOutcomeKind::Forced => "force pushed".to_string(),
        RepoOutcomeKind::NotPushed => "not pushed".to_string(),
        kind => match &outcome.error {
            Some(reason) => format!("{}: {}", kind.as_str().replace('_', " "), reason.trim()),
            None => kind.as_str().replace('_', " "),
        },
    }
}
