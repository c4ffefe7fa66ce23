//! Force-with-lease tokens.
//!
//! The expected remote tip comes from the local remote-tracking ref only;
//! nothing here talks to the network. If the remote moved since the last
//! fetch the push is rejected with `stale info`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::push::spec::PushTarget;

/// What the remote ref must currently be for the forced push to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "hash")]
pub enum LeaseExpectation {
    /// The ref must not exist yet.
    Absent,
    /// The ref must point at this commit.
    Commit(String),
}

/// Value of one `--force-with-lease=` argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceLeaseToken {
    pub remote_ref: String,
    pub expectation: LeaseExpectation,
}

impl ForceLeaseToken {
    /// Render as the `--force-with-lease` parameter value.
    pub fn to_param(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ForceLeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expectation {
            LeaseExpectation::Absent => write!(f, "{}:", self.remote_ref),
            LeaseExpectation::Commit(hash) => write!(f, "{}:{}", self.remote_ref, hash),
        }
    }
}

/// Compute the lease for pushing to `target`, given the locally known
/// remote-tracking tip.
///
/// Special destinations have no remote-tracking counterpart and get no lease.
pub fn force_lease_token(target: &PushTarget, known_tip: Option<&str>) -> Option<ForceLeaseToken> {
    if target.special_ref {
        return None;
    }
    let expectation = match known_tip.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hash) => LeaseExpectation::Commit(hash.to_string()),
        None => LeaseExpectation::Absent,
    };
    Some(ForceLeaseToken {
        remote_ref: target.remote_ref(),
        expectation,
    })
}
