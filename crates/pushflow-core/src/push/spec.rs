//! Push inputs: repository identity, push source/target and run options.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Prefix of local branch refs.
pub const REFS_HEADS: &str = "refs/heads/";
/// Prefix of tag refs.
pub const REFS_TAGS: &str = "refs/tags/";
/// Prefix of remote-tracking refs.
pub const REFS_REMOTES: &str = "refs/remotes/";

/// Identifies a local repository by its root directory.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RepoId {
    pub root: PathBuf,
}

impl RepoId {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

/// What local state is sent to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PushSource {
    /// A local branch, by short name (`main`).
    Branch { name: String },
    /// An explicit commit.
    Revision { hash: String },
    /// Whatever `HEAD` points to while detached.
    DetachedHead,
    /// A tag, by short name (`v1.0`).
    Tag { name: String },
}

impl PushSource {
    pub fn branch(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.strip_prefix(REFS_HEADS).map(str::to_string).unwrap_or(name);
        Self::Branch { name }
    }

    /// Revision string used on the left-hand side of the refspec.
    pub fn revision(&self) -> String {
        match self {
            Self::Branch { name } => format!("{REFS_HEADS}{name}"),
            Self::Revision { hash } => hash.clone(),
            Self::DetachedHead => "HEAD".to_string(),
            Self::Tag { name } => format!("{REFS_TAGS}{name}"),
        }
    }

    /// Local branch name, when the source is a branch.
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            Self::Branch { name } => Some(name),
            _ => None,
        }
    }

    /// Name reported in outcomes: the branch name, or the revision itself.
    pub fn display_name(&self) -> String {
        match self {
            Self::Branch { name } => name.clone(),
            other => other.revision(),
        }
    }
}

/// Where the push goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTarget {
    /// Remote name, e.g. `origin`.
    pub remote: String,
    /// Branch name for remote operations (`main`), or a full ref for special targets.
    pub branch: String,
    /// The branch does not exist on the remote yet.
    pub new_branch: bool,
    /// The destination lives outside `refs/heads/` (e.g. `refs/for/main`).
    pub special_ref: bool,
}

impl PushTarget {
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        let branch = branch
            .strip_prefix(REFS_HEADS)
            .map(str::to_string)
            .unwrap_or(branch);
        Self {
            remote: remote.into(),
            branch,
            new_branch: false,
            special_ref: false,
        }
    }

    pub fn new_branch(mut self) -> Self {
        self.new_branch = true;
        self
    }

    /// A non-standard destination ref, pushed to verbatim.
    pub fn special(remote: impl Into<String>, full_ref: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            branch: full_ref.into(),
            new_branch: false,
            special_ref: true,
        }
    }

    /// The ref updated on the remote side.
    pub fn remote_ref(&self) -> String {
        if self.special_ref || self.branch.starts_with("refs/") {
            self.branch.clone()
        } else {
            format!("{REFS_HEADS}{}", self.branch)
        }
    }

    /// The local remote-tracking ref mirroring the target.
    pub fn tracking_ref(&self) -> String {
        format!("{REFS_REMOTES}{}/{}", self.remote, self.branch)
    }
}

/// Immutable per-repository push request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSpec {
    pub source: PushSource,
    pub target: PushTarget,
}

impl PushSpec {
    pub fn new(source: PushSource, target: PushTarget) -> Self {
        Self { source, target }
    }

    /// Build the `<sourceRevision>:<targetRef>` refspec.
    ///
    /// The target is qualified under `refs/heads/` when upstream tracking is
    /// being set up or the source is not itself a full ref, since git cannot
    /// infer the destination namespace in those cases.
    pub fn refspec(&self, set_upstream: bool) -> String {
        let source = self.source.revision();
        let target = &self.target;
        let target_ref = if !target.special_ref
            && !target.branch.starts_with("refs/")
            && (set_upstream || !source.starts_with("refs/"))
        {
            format!("{REFS_HEADS}{}", target.branch)
        } else {
            target.branch.clone()
        };
        format!("{source}:{target_ref}")
    }
}

/// Repositories to push, in dependency order, each with its push spec.
///
/// The order is taken as given (submodules after their parents) and stays
/// stable for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPlan {
    entries: Vec<(RepoId, PushSpec)>,
}

impl PushPlan {
    /// Build a plan; a repeated repository keeps its first spec.
    pub fn new(entries: impl IntoIterator<Item = (RepoId, PushSpec)>) -> Self {
        let mut plan = Self::default();
        for (repo, spec) in entries {
            if plan.spec(&repo).is_none() {
                plan.entries.push((repo, spec));
            }
        }
        plan
    }

    pub fn spec(&self, repo: &RepoId) -> Option<&PushSpec> {
        self.entries.iter().find(|(r, _)| r == repo).map(|(_, s)| s)
    }

    /// Repositories in push order.
    pub fn order(&self) -> Vec<RepoId> {
        self.entries.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepoId, &PushSpec)> {
        self.entries.iter().map(|(r, s)| (r, s))
    }

    pub fn contains(&self, repo: &RepoId) -> bool {
        self.spec(repo).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forcing policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceMode {
    #[default]
    None,
    /// Unconditional `--force`.
    Force,
    /// `--force-with-lease` against the locally known remote tip.
    ForceWithLease,
}

impl ForceMode {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Which tags travel with the push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// `--tags`
    All,
    /// `--follow-tags`
    FollowTags,
}

impl TagMode {
    pub fn argument(self) -> &'static str {
        match self {
            Self::All => "--tags",
            Self::FollowTags => "--follow-tags",
        }
    }
}

/// Options shared by every repository in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOptions {
    pub force_mode: ForceMode,
    pub tag_mode: Option<TagMode>,
    /// Pass `--no-verify` to skip pre-push hooks.
    pub skip_hooks: bool,
}
