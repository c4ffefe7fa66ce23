//! In-memory fakes for the push collaborators (testing only)
//!
//! Provides scripted transports, executors, updaters and deciders plus a
//! recording repository state, settings store and listener. None of them
//! touch the filesystem or spawn processes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::{UpdateMethod, UpdateSettings};
use crate::error::{PushError, PushResult};
use crate::push::collaborators::{
    Progress, PushListener, PushParams, PushTransport, RepositoryState, SettingsStore, TrackInfo,
    TransportOutput, UpdateMethodDecider, UpdatePrompt, UpdateReport, Updater,
};
use crate::push::executor::PushAttemptExecutor;
use crate::push::outcome::{RepoOutcome, UpdateOutcome};
use crate::push::spec::{PushTarget, RepoId};

/// Pop the next scripted value, repeating the last one once the script runs out.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// Transport answering each repository from a queue of canned outputs.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<RepoId, VecDeque<TransportOutput>>>,
    calls: Mutex<Vec<(RepoId, PushParams)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for `repo`; the last queued output repeats forever.
    pub fn script(&self, repo: &RepoId, output: TransportOutput) {
        self.scripts
            .lock()
            .unwrap()
            .entry(repo.clone())
            .or_default()
            .push_back(output);
    }

    pub fn calls(&self) -> Vec<(RepoId, PushParams)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, repo: &RepoId) -> usize {
        self.calls.lock().unwrap().iter().filter(|(r, _)| r == repo).count()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn push(
        &self,
        repo: &RepoId,
        params: &PushParams,
        _progress: &Progress,
    ) -> PushResult<TransportOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((repo.clone(), params.clone()));
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .get_mut(repo)
            .and_then(next_scripted)
            .ok_or_else(|| PushError::Transport {
                repo: repo.to_string(),
                detail: "no scripted output".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// FakeRepositoryState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StateInner {
    current_branches: HashMap<RepoId, String>,
    tracking: HashMap<(RepoId, String), TrackInfo>,
    remote_tips: HashMap<(RepoId, String), String>,
    heads: HashMap<RepoId, VecDeque<String>>,
    range_sizes: HashMap<String, usize>,
    tracked: Vec<RepoId>,
    refreshes: Vec<RepoId>,
}

/// Repository state held in memory.
#[derive(Debug, Default)]
pub struct FakeRepositoryState {
    inner: Mutex<StateInner>,
}

impl FakeRepositoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out `branch` in `repo`, tracking `remote/branch`.
    pub fn with_tracked_branch(self, repo: &RepoId, remote: &str, branch: &str) -> Self {
        self.set_current_branch(repo, branch);
        self.set_tracking(repo, branch, TrackInfo::new(remote, branch));
        self.inner.lock().unwrap().tracked.push(repo.clone());
        self
    }

    pub fn set_current_branch(&self, repo: &RepoId, branch: &str) {
        self.inner
            .lock()
            .unwrap()
            .current_branches
            .insert(repo.clone(), branch.to_string());
    }

    pub fn set_tracking(&self, repo: &RepoId, branch: &str, info: TrackInfo) {
        self.inner
            .lock()
            .unwrap()
            .tracking
            .insert((repo.clone(), branch.to_string()), info);
    }

    pub fn set_remote_tip(&self, repo: &RepoId, tracking_ref: &str, hash: &str) {
        self.inner
            .lock()
            .unwrap()
            .remote_tips
            .insert((repo.clone(), tracking_ref.to_string()), hash.to_string());
    }

    /// Queue successive `HEAD` positions; the last one repeats.
    pub fn push_head(&self, repo: &RepoId, hash: &str) {
        self.inner
            .lock()
            .unwrap()
            .heads
            .entry(repo.clone())
            .or_default()
            .push_back(hash.to_string());
    }

    pub fn set_range_size(&self, range: &str, size: usize) {
        self.inner
            .lock()
            .unwrap()
            .range_sizes
            .insert(range.to_string(), size);
    }

    pub fn add_tracked(&self, repo: &RepoId) {
        self.inner.lock().unwrap().tracked.push(repo.clone());
    }

    pub fn refreshes(&self) -> Vec<RepoId> {
        self.inner.lock().unwrap().refreshes.clone()
    }
}

#[async_trait]
impl RepositoryState for FakeRepositoryState {
    async fn current_branch(&self, repo: &RepoId) -> PushResult<Option<String>> {
        Ok(self.inner.lock().unwrap().current_branches.get(repo).cloned())
    }

    async fn tracking_info(&self, repo: &RepoId, branch: &str) -> PushResult<Option<TrackInfo>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tracking
            .get(&(repo.clone(), branch.to_string()))
            .cloned())
    }

    async fn remote_tracking_tip(
        &self,
        repo: &RepoId,
        target: &PushTarget,
    ) -> PushResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .remote_tips
            .get(&(repo.clone(), target.tracking_ref()))
            .cloned())
    }

    async fn head_position(&self, repo: &RepoId) -> PushResult<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.heads.get_mut(repo).and_then(next_scripted))
    }

    async fn count_commits(&self, _repo: &RepoId, range: &str) -> PushResult<usize> {
        self.inner
            .lock()
            .unwrap()
            .range_sizes
            .get(range)
            .copied()
            .ok_or_else(|| PushError::Git(format!("unknown range {range}")))
    }

    async fn tracked_repositories(&self) -> Vec<RepoId> {
        self.inner.lock().unwrap().tracked.clone()
    }

    async fn refresh(&self, repo: &RepoId) {
        self.inner.lock().unwrap().refreshes.push(repo.clone());
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Executor returning one canned outcome map per attempt.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    attempts: Mutex<VecDeque<BTreeMap<RepoId, RepoOutcome>>>,
    calls: Mutex<Vec<Vec<RepoId>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcomes of the next attempt; the last one repeats.
    pub fn then(self, outcomes: impl IntoIterator<Item = (RepoId, RepoOutcome)>) -> Self {
        self.attempts
            .lock()
            .unwrap()
            .push_back(outcomes.into_iter().collect());
        self
    }

    /// Repositories requested by each attempt so far.
    pub fn calls(&self) -> Vec<Vec<RepoId>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushAttemptExecutor for ScriptedExecutor {
    async fn push(
        &self,
        repos: &[RepoId],
        _progress: &Progress,
    ) -> PushResult<BTreeMap<RepoId, RepoOutcome>> {
        self.calls.lock().unwrap().push(repos.to_vec());
        let mut attempts = self.attempts.lock().unwrap();
        let mut outcomes = next_scripted(&mut attempts).unwrap_or_default();
        outcomes.retain(|repo, _| repos.contains(repo));
        Ok(outcomes)
    }
}

// ---------------------------------------------------------------------------
// ScriptedUpdater
// ---------------------------------------------------------------------------

/// Updater reporting canned outcomes and recording its calls.
#[derive(Debug)]
pub struct ScriptedUpdater {
    outcomes: Mutex<VecDeque<UpdateReport>>,
    rebase_over_merge_problem: bool,
    calls: Mutex<Vec<(Vec<RepoId>, UpdateMethod, bool)>>,
}

impl ScriptedUpdater {
    pub fn new(outcome: UpdateOutcome) -> Self {
        Self::reporting(UpdateReport::new(outcome))
    }

    /// Start with a full report, e.g. one listing updated files.
    pub fn reporting(report: UpdateReport) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from([report])),
            rebase_over_merge_problem: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a report for the following call; the last one repeats.
    pub fn then(self, report: UpdateReport) -> Self {
        self.outcomes.lock().unwrap().push_back(report);
        self
    }

    pub fn with_rebase_over_merge_problem(mut self) -> Self {
        self.rebase_over_merge_problem = true;
        self
    }

    /// `(repositories, method, check_rebase_over_merge)` per call.
    pub fn calls(&self) -> Vec<(Vec<RepoId>, UpdateMethod, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Updater for ScriptedUpdater {
    async fn update(
        &self,
        repos: &[RepoId],
        method: UpdateMethod,
        check_rebase_over_merge: bool,
        _progress: &Progress,
    ) -> PushResult<UpdateReport> {
        self.calls
            .lock()
            .unwrap()
            .push((repos.to_vec(), method, check_rebase_over_merge));
        let mut outcomes = self.outcomes.lock().unwrap();
        Ok(next_scripted(&mut outcomes).unwrap_or_else(|| UpdateReport::new(UpdateOutcome::Failure)))
    }

    async fn has_rebase_over_merge_problem(&self, _repos: &[RepoId]) -> bool {
        self.rebase_over_merge_problem
    }
}

// ---------------------------------------------------------------------------
// ScriptedDecider
// ---------------------------------------------------------------------------

/// Decider with a fixed answer that records the prompts it was shown.
#[derive(Debug)]
pub struct ScriptedDecider {
    answer: Option<UpdateSettings>,
    prompts: Mutex<Vec<UpdatePrompt>>,
}

impl ScriptedDecider {
    pub fn choosing(settings: UpdateSettings) -> Self {
        Self {
            answer: Some(settings),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling() -> Self {
        Self {
            answer: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<UpdatePrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateMethodDecider for ScriptedDecider {
    async fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateSettings> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.answer
    }
}

// ---------------------------------------------------------------------------
// Recording settings store and listener
// ---------------------------------------------------------------------------

/// Settings store keeping every saved value.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    saved: Mutex<Vec<UpdateSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<UpdateSettings> {
        self.saved.lock().unwrap().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn save_update_settings(&self, settings: &UpdateSettings) -> PushResult<()> {
        self.saved.lock().unwrap().push(*settings);
        Ok(())
    }
}

/// Listener keeping every notification.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(RepoId, RepoOutcome)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(RepoId, RepoOutcome)> {
        self.events.lock().unwrap().clone()
    }
}

impl PushListener for RecordingListener {
    fn on_repo_outcome(&self, repo: &RepoId, outcome: &RepoOutcome) {
        self.events
            .lock()
            .unwrap()
            .push((repo.clone(), outcome.clone()));
    }
}
