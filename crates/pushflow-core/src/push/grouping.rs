//! Partition of per-repository outcomes into the buckets that drive the
//! retry decision.

use std::collections::BTreeMap;

use crate::push::outcome::{RepoOutcome, RepoOutcomeKind};
use crate::push::spec::RepoId;

/// Outcomes split by what the orchestrator should do about them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedOutcomes {
    pub successful: BTreeMap<RepoId, RepoOutcome>,
    pub errors: BTreeMap<RepoId, RepoOutcome>,
    /// Fast-forward rejections only.
    pub rejected: BTreeMap<RepoId, RepoOutcome>,
    /// Stale-info and other rejections.
    pub custom_rejected: BTreeMap<RepoId, RepoOutcome>,
}

impl GroupedOutcomes {
    pub fn group(outcomes: &BTreeMap<RepoId, RepoOutcome>) -> Self {
        let mut grouped = Self::default();
        for (repo, outcome) in outcomes {
            let bucket = match outcome.kind {
                RepoOutcomeKind::RejectedNoFastForward => &mut grouped.rejected,
                RepoOutcomeKind::Error => &mut grouped.errors,
                RepoOutcomeKind::RejectedStaleInfo | RepoOutcomeKind::RejectedOther => {
                    &mut grouped.custom_rejected
                }
                _ => &mut grouped.successful,
            };
            bucket.insert(repo.clone(), outcome.clone());
        }
        grouped
    }

    /// Errors and custom rejections cannot be fixed by updating.
    pub fn has_terminal(&self) -> bool {
        !self.errors.is_empty() || !self.custom_rejected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::spec::{PushSource, PushSpec, PushTarget};
    use std::collections::BTreeSet;

    const ALL_KINDS: [RepoOutcomeKind; 9] = [
        RepoOutcomeKind::Success,
        RepoOutcomeKind::NewBranch,
        RepoOutcomeKind::UpToDate,
        RepoOutcomeKind::Forced,
        RepoOutcomeKind::RejectedNoFastForward,
        RepoOutcomeKind::RejectedStaleInfo,
        RepoOutcomeKind::RejectedOther,
        RepoOutcomeKind::Error,
        RepoOutcomeKind::NotPushed,
    ];

    fn outcome(kind: RepoOutcomeKind) -> RepoOutcome {
        let spec = PushSpec::new(PushSource::branch("main"), PushTarget::new("origin", "main"));
        let mut o = RepoOutcome::not_pushed(&spec);
        o.kind = kind;
        o
    }

    fn keys(map: &BTreeMap<RepoId, RepoOutcome>) -> BTreeSet<RepoId> {
        map.keys().cloned().collect()
    }

    #[test]
    fn test_partition_is_total_and_disjoint() {
        // Every combination of kinds over three repositories.
        for a in ALL_KINDS {
            for b in ALL_KINDS {
                for c in ALL_KINDS {
                    let input: BTreeMap<RepoId, RepoOutcome> = [("a", a), ("b", b), ("c", c)]
                        .into_iter()
                        .map(|(name, kind)| (RepoId::new(name), outcome(kind)))
                        .collect();
                    let grouped = GroupedOutcomes::group(&input);

                    let buckets = [
                        keys(&grouped.successful),
                        keys(&grouped.errors),
                        keys(&grouped.rejected),
                        keys(&grouped.custom_rejected),
                    ];
                    for i in 0..buckets.len() {
                        for j in (i + 1)..buckets.len() {
                            assert!(buckets[i].is_disjoint(&buckets[j]));
                        }
                    }
                    let union: BTreeSet<RepoId> = buckets.into_iter().flatten().collect();
                    assert_eq!(union, keys(&input));
                }
            }
        }
    }

    #[test]
    fn test_bucket_assignment() {
        let input: BTreeMap<RepoId, RepoOutcome> = [
            ("ff", RepoOutcomeKind::RejectedNoFastForward),
            ("err", RepoOutcomeKind::Error),
            ("stale", RepoOutcomeKind::RejectedStaleInfo),
            ("hook", RepoOutcomeKind::RejectedOther),
            ("np", RepoOutcomeKind::NotPushed),
        ]
        .into_iter()
        .map(|(name, kind)| (RepoId::new(name), outcome(kind)))
        .collect();
        let grouped = GroupedOutcomes::group(&input);
        assert!(grouped.rejected.contains_key(&RepoId::new("ff")));
        assert!(grouped.errors.contains_key(&RepoId::new("err")));
        assert!(grouped.custom_rejected.contains_key(&RepoId::new("stale")));
        assert!(grouped.custom_rejected.contains_key(&RepoId::new("hook")));
        assert!(grouped.successful.contains_key(&RepoId::new("np")));
        assert!(grouped.has_terminal());
    }

    #[test]
    fn test_empty_input() {
        let grouped = GroupedOutcomes::group(&BTreeMap::new());
        assert_eq!(grouped, GroupedOutcomes::default());
        assert!(!grouped.has_terminal());
    }
}
