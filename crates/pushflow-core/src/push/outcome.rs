//! Domain-level push outcomes and the classifier that produces them.

use serde::{Deserialize, Serialize};

use crate::error::{PushError, PushResult};
use crate::push::native::{NativeKind, NativeOutcome};
use crate::push::spec::PushSpec;

/// Rejection reasons a local update can fix.
const NO_FAST_FORWARD_MARKERS: &[&str] = &["non-fast-forward", "fetch first", "failed to lock"];
/// Rejection reason of a failed force-with-lease precondition.
const STALE_INFO_MARKER: &str = "stale info";

/// Per-repository result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoOutcomeKind {
    Success,
    NewBranch,
    UpToDate,
    Forced,
    /// The remote has commits we don't; an update then retry may succeed.
    RejectedNoFastForward,
    /// Force-with-lease failed because the remote moved.
    RejectedStaleInfo,
    /// Hook or policy refusal.
    RejectedOther,
    Error,
    NotPushed,
}

impl RepoOutcomeKind {
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            Self::RejectedNoFastForward | Self::RejectedStaleInfo | Self::RejectedOther
        )
    }

    /// Whether the repository's branch reached the remote (or already was there).
    pub fn is_pushed(self) -> bool {
        matches!(
            self,
            Self::Success | Self::NewBranch | Self::UpToDate | Self::Forced
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NewBranch => "new_branch",
            Self::UpToDate => "up_to_date",
            Self::Forced => "forced",
            Self::RejectedNoFastForward => "rejected_no_fast_forward",
            Self::RejectedStaleInfo => "rejected_stale_info",
            Self::RejectedOther => "rejected_other",
            Self::Error => "error",
            Self::NotPushed => "not_pushed",
        }
    }
}

/// Result of the external merge/rebase step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    CleanSuccess,
    NothingToUpdate,
    SuccessWithResolvedConflicts,
    /// Stopped midway, e.g. on unresolved conflicts.
    Incomplete,
    Cancelled,
    Failure,
}

impl UpdateOutcome {
    /// Whether pushing may continue after this update.
    pub fn allows_retry(self) -> bool {
        matches!(self, Self::CleanSuccess | Self::NothingToUpdate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CleanSuccess => "clean_success",
            Self::NothingToUpdate => "nothing_to_update",
            Self::SuccessWithResolvedConflicts => "success_with_resolved_conflicts",
            Self::Incomplete => "incomplete",
            Self::Cancelled => "cancelled",
            Self::Failure => "failure",
        }
    }
}

/// Durable per-repository push result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOutcome {
    pub kind: RepoOutcomeKind,
    /// Number of commits that reached the remote; `None` when unknown.
    pub pushed_commits: Option<usize>,
    pub source_branch: String,
    pub target_branch: String,
    pub target_remote: String,
    /// Additional refs (tags) created or updated by the same push.
    pub pushed_tags: Vec<String>,
    pub error: Option<String>,
    /// Set when an update step ran after this repository was rejected.
    pub update_outcome: Option<UpdateOutcome>,
}

impl RepoOutcome {
    fn base(kind: RepoOutcomeKind, spec: &PushSpec) -> Self {
        Self {
            kind,
            pushed_commits: None,
            source_branch: spec.source.display_name(),
            target_branch: spec.target.remote_ref(),
            target_remote: spec.target.remote.clone(),
            pushed_tags: Vec::new(),
            error: None,
            update_outcome: None,
        }
    }

    /// The repository was never reached during the run.
    pub fn not_pushed(spec: &PushSpec) -> Self {
        Self::base(RepoOutcomeKind::NotPushed, spec)
    }

    /// The push invocation itself failed.
    pub fn error(spec: &PushSpec, error: impl Into<String>) -> Self {
        let mut outcome = Self::base(RepoOutcomeKind::Error, spec);
        outcome.error = Some(error.into());
        outcome
    }

    /// Build from the primary native line of a push.
    ///
    /// `pushed_commits` is only kept for successful pushes.
    pub fn from_native(
        primary: &NativeOutcome,
        tags: &[NativeOutcome],
        pushed_commits: Option<usize>,
        spec: &PushSpec,
    ) -> PushResult<Self> {
        let kind = classify(primary)?;
        let mut outcome = Self::base(kind, spec);
        outcome.pushed_commits = pushed_commits.filter(|_| kind == RepoOutcomeKind::Success);
        outcome.pushed_tags = tags.iter().map(|t| t.source_ref.clone()).collect();
        if kind.is_rejection() {
            outcome.error = primary.reason.clone();
        }
        Ok(outcome)
    }

    pub fn with_update(mut self, update: UpdateOutcome) -> Self {
        self.update_outcome = Some(update);
        self
    }
}

/// Classify a rejection by its free-text reason.
pub fn classify_rejection(reason: Option<&str>) -> RepoOutcomeKind {
    let reason = reason.unwrap_or_default().to_lowercase();
    if NO_FAST_FORWARD_MARKERS.iter().any(|m| reason.contains(m)) {
        RepoOutcomeKind::RejectedNoFastForward
    } else if reason.contains(STALE_INFO_MARKER) {
        RepoOutcomeKind::RejectedStaleInfo
    } else {
        RepoOutcomeKind::RejectedOther
    }
}

/// Map a native outcome into a domain outcome kind.
///
/// Deletions are not supported and yield [`PushError::UnsupportedOutcome`].
pub fn classify(native: &NativeOutcome) -> PushResult<RepoOutcomeKind> {
    match native.kind {
        NativeKind::Success => Ok(RepoOutcomeKind::Success),
        NativeKind::ForcedUpdate => Ok(RepoOutcomeKind::Forced),
        NativeKind::NewRef => Ok(RepoOutcomeKind::NewBranch),
        NativeKind::UpToDate => Ok(RepoOutcomeKind::UpToDate),
        NativeKind::Error => Ok(RepoOutcomeKind::Error),
        NativeKind::Rejected => Ok(classify_rejection(native.reason.as_deref())),
        NativeKind::Deleted => Err(PushError::UnsupportedOutcome {
            kind: native.kind.as_str().to_string(),
        }),
    }
}
