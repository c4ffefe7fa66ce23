//! Error taxonomy for push orchestration.
//!
//! Most push failures are not errors at this level: rejections, transport
//! failures and update problems are recorded in each repository's
//! [`RepoOutcome`](crate::push::RepoOutcome). `PushError` covers collaborator
//! failures and programming errors.

use thiserror::Error;

/// Errors produced by the push orchestration layer.
#[derive(Debug, Error)]
pub enum PushError {
    /// The push transport could not be invoked at all.
    #[error("transport error in {repo}: {detail}")]
    Transport { repo: String, detail: String },

    /// A git command used to read local repository state failed.
    #[error("git error: {0}")]
    Git(String),

    /// A native outcome reached the classifier that has no domain mapping.
    #[error("unsupported push outcome: {kind}")]
    UnsupportedOutcome { kind: String },

    /// Reading or writing push settings failed.
    #[error("settings error: {0}")]
    Settings(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type PushResult<T> = std::result::Result<T, PushError>;
