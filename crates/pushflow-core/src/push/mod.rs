//! Push orchestration.
//!
//! Provides:
//! - [`native::parse_push_output`]: porcelain `git push` output parsing
//! - [`outcome::classify`]: native results to domain outcomes
//! - [`lease::force_lease_token`]: `--force-with-lease` expectations
//! - [`grouping::GroupedOutcomes`]: retry-decision buckets
//! - [`executor::GitPushExecutor`]: one push attempt over many repositories
//! - [`orchestrator::PushOrchestrator`]: the bounded update-and-retry loop
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pushflow_core::git::{GitCli, GitUpdater};
//! use pushflow_core::push::{GitPushExecutor, PushOrchestrator, PushOptions, PushPlan};
//!
//! let git = Arc::new(GitCli::new(repos.clone()));
//! let executor = Arc::new(GitPushExecutor::new(plan.clone(), options.clone(), git.clone(), git.clone()));
//! let result = PushOrchestrator::new(plan, options, executor, git, Arc::new(GitUpdater::new()))
//!     .run()
//!     .await?;
//! ```

pub mod collaborators;
pub mod executor;
pub mod fakes;
pub mod grouping;
pub mod lease;
pub mod native;
pub mod orchestrator;
pub mod outcome;
pub mod result;
pub mod spec;

pub use collaborators::{
    AcceptDefaults, NoSettingsStore, Progress, PushListener, PushParams, PushTransport,
    RepositoryState, SettingsStore, TrackInfo, TracingListener, TransportOutput,
    UpdateMethodDecider, UpdatePrompt, UpdateReport, Updater,
};
pub use executor::{fill_not_pushed, primary_outcome, GitPushExecutor, PushAttemptExecutor};
pub use grouping::GroupedOutcomes;
pub use lease::{force_lease_token, ForceLeaseToken, LeaseExpectation};
pub use native::{parse_push_output, NativeKind, NativeOutcome};
pub use orchestrator::{PushOrchestrator, PushState, MAX_PUSH_ATTEMPTS};
pub use outcome::{classify, classify_rejection, RepoOutcome, RepoOutcomeKind, UpdateOutcome};
pub use result::{HashRange, HistoryLabel, RunResult};
pub use spec::{
    ForceMode, PushOptions, PushPlan, PushSource, PushSpec, PushTarget, RepoId, TagMode,
};
