//! Pushflow Core Library
//!
//! Pushes several git repositories as one operation, updating and retrying
//! the ones the remote rejects.

pub mod config;
pub mod error;
pub mod git;
pub mod metrics;
pub mod obs;
pub mod push;
pub mod telemetry;

pub use config::{JsonSettingsStore, PushSettings, UpdateMethod, UpdateSettings};
pub use error::{PushError, PushResult};
pub use git::{GitCli, GitUpdater};
pub use telemetry::init_tracing;
pub use push::{
    GitPushExecutor, PushOptions, PushOrchestrator, PushPlan, PushSource, PushSpec, PushTarget,
    RepoId, RepoOutcome, RepoOutcomeKind, RunResult,
};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
