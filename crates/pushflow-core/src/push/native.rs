//! Parser for the per-ref lines printed by `git push --porcelain`.
//!
//! Each meaningful line has the shape
//! `<flag>\t<from>:<to>\t<summary> (<reason>)`. Everything else (progress,
//! `To <url>`, `Done`) is skipped.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const LINE_PATTERN: &str = r"^.*([ +\-*!=])\t(\S+):(\S+)\t([^(]+)(?:\((.+)\))?.*$";
const RANGE_PATTERN: &str = r"^[0-9a-f]+\.{2,3}[0-9a-f]+$";

/// Kind of a single ref update as reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeKind {
    Success,
    ForcedUpdate,
    NewRef,
    Rejected,
    Deleted,
    UpToDate,
    /// Transport-level failure with no parseable lines.
    Error,
}

impl NativeKind {
    /// Map a porcelain flag character.
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            ' ' => Some(Self::Success),
            '+' => Some(Self::ForcedUpdate),
            '-' => Some(Self::Deleted),
            '*' => Some(Self::NewRef),
            '!' => Some(Self::Rejected),
            '=' => Some(Self::UpToDate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ForcedUpdate => "forced_update",
            Self::NewRef => "new_ref",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
            Self::UpToDate => "up_to_date",
            Self::Error => "error",
        }
    }
}

/// One parsed ref line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeOutcome {
    pub kind: NativeKind,
    pub source_ref: String,
    pub target_ref: String,
    pub summary: String,
    pub reason: Option<String>,
    /// `old..new` or `old...new` when the summary is a commit range.
    pub range: Option<String>,
}

impl NativeOutcome {
    /// Whether the source ref names the branch or commit actually requested,
    /// as opposed to a tag carried along with it.
    pub fn is_branch_candidate(&self) -> bool {
        let source = self.source_ref.as_str();
        source.starts_with("refs/heads/") || is_hash(source) || source.starts_with("HEAD")
    }
}

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("porcelain line pattern is valid"))
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RANGE_PATTERN).expect("range pattern is valid"))
}

/// Abbreviated or full hexadecimal object name.
pub fn is_hash(s: &str) -> bool {
    (4..=64).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse a single line, returning `None` for protocol noise.
pub fn parse_line(line: &str) -> Option<NativeOutcome> {
    let caps = line_regex().captures(line)?;
    let flag = caps.get(1)?.as_str().chars().next()?;
    let Some(kind) = NativeKind::from_flag(flag) else {
        tracing::error!(line = %line, flag = %flag, "unmapped push result flag");
        return None;
    };

    let summary = caps.get(4).map(|m| m.as_str().trim()).unwrap_or_default();
    let range = range_regex()
        .is_match(summary)
        .then(|| summary.to_string());

    Some(NativeOutcome {
        kind,
        source_ref: caps[2].to_string(),
        target_ref: caps[3].to_string(),
        summary: summary.to_string(),
        reason: caps.get(5).map(|m| m.as_str().to_string()),
        range,
    })
}

/// Parse the complete output of one push invocation, in order.
pub fn parse_push_output<I, S>(lines: I) -> Vec<NativeOutcome>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_flag_parses_with_range_and_reason() {
        let cases = [
            (' ', NativeKind::Success),
            ('+', NativeKind::ForcedUpdate),
            ('-', NativeKind::Deleted),
            ('*', NativeKind::NewRef),
            ('!', NativeKind::Rejected),
            ('=', NativeKind::UpToDate),
        ];
        for (flag, kind) in cases {
            let line = format!("{flag}\trefs/heads/a:refs/remotes/origin/a\tabc123..def456 (reason text)");
            let parsed = parse_line(&line).unwrap_or_else(|| panic!("flag {flag:?} did not parse"));
            assert_eq!(parsed.kind, kind);
            assert_eq!(parsed.source_ref, "refs/heads/a");
            assert_eq!(parsed.target_ref, "refs/remotes/origin/a");
            assert_eq!(parsed.range.as_deref(), Some("abc123..def456"));
            assert_eq!(parsed.reason.as_deref(), Some("reason text"));
        }
    }

    #[test]
    fn test_rejected_line_without_range() {
        let parsed =
            parse_line("!\trefs/heads/main:refs/heads/main\t[rejected] (non-fast-forward)").unwrap();
        assert_eq!(parsed.kind, NativeKind::Rejected);
        assert_eq!(parsed.summary, "[rejected]");
        assert_eq!(parsed.range, None);
        assert_eq!(parsed.reason.as_deref(), Some("non-fast-forward"));
    }

    #[test]
    fn test_forced_update_triple_dot_range() {
        let parsed = parse_line("+\trefs/heads/f:refs/heads/f\t1a2b...3c4d (forced update)").unwrap();
        assert_eq!(parsed.kind, NativeKind::ForcedUpdate);
        assert_eq!(parsed.range.as_deref(), Some("1a2b...3c4d"));
    }

    #[test]
    fn test_prefix_before_flag_is_tolerated() {
        let parsed = parse_line("remote: junk*\trefs/tags/v1:refs/tags/v1\t[new tag]").unwrap();
        assert_eq!(parsed.kind, NativeKind::NewRef);
        assert_eq!(parsed.source_ref, "refs/tags/v1");
        assert_eq!(parsed.reason, None);
    }

    #[test]
    fn test_noise_is_skipped() {
        let out = parse_push_output([
            "To /tmp/remote.git",
            "Enumerating objects: 5, done.",
            " \trefs/heads/main:refs/heads/main\tabc123..def456",
            "=\trefs/heads/dev:refs/heads/dev\t[up to date]",
            "Done",
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, NativeKind::Success);
        assert_eq!(out[1].kind, NativeKind::UpToDate);
        assert_eq!(out[1].summary, "[up to date]");
    }

    #[test]
    fn test_non_hex_summary_is_not_a_range() {
        let parsed = parse_line("*\trefs/heads/new:refs/heads/new\t[new branch]").unwrap();
        assert_eq!(parsed.range, None);
    }

    #[test]
    fn test_branch_candidates() {
        let mk = |source: &str| NativeOutcome {
            kind: NativeKind::Success,
            source_ref: source.to_string(),
            target_ref: "refs/heads/main".to_string(),
            summary: String::new(),
            reason: None,
            range: None,
        };
        assert!(mk("refs/heads/main").is_branch_candidate());
        assert!(mk("HEAD").is_branch_candidate());
        assert!(mk("0123456789abcdef0123456789abcdef01234567").is_branch_candidate());
        assert!(!mk("refs/tags/v1").is_branch_candidate());
    }
}
