//! Push orchestration over in-memory collaborators.
//!
//! Covers the retry bound, terminal results, not-pushed fill-in, the update
//! prompt and the two-repository push/update/re-push scenario.

use std::sync::Arc;

use pushflow_core::config::{PushSettings, UpdateMethod, UpdateSettings};
use pushflow_core::push::collaborators::{TransportOutput, UpdateReport};
use pushflow_core::push::fakes::{
    FakeRepositoryState, MemorySettingsStore, RecordingListener, ScriptedDecider,
    ScriptedExecutor, ScriptedTransport, ScriptedUpdater,
};
use pushflow_core::push::{
    ForceMode, GitPushExecutor, PushOptions, PushOrchestrator, PushPlan, PushSource, PushSpec,
    PushTarget, RepoId, RepoOutcome, RepoOutcomeKind, UpdateOutcome, MAX_PUSH_ATTEMPTS,
};
use pushflow_core::PushError;

fn main_spec() -> PushSpec {
    PushSpec::new(
        PushSource::branch("refs/heads/main"),
        PushTarget::new("origin", "refs/heads/main"),
    )
}

fn plan(repos: &[&RepoId]) -> PushPlan {
    PushPlan::new(repos.iter().map(|r| ((*r).clone(), main_spec())))
}

fn outcome(kind: RepoOutcomeKind) -> RepoOutcome {
    let mut o = RepoOutcome::not_pushed(&main_spec());
    o.kind = kind;
    o
}

fn tracked_state(repos: &[&RepoId]) -> FakeRepositoryState {
    repos.iter().fold(FakeRepositoryState::new(), |state, repo| {
        state.with_tracked_branch(repo, "origin", "main")
    })
}

fn auto_update() -> PushSettings {
    PushSettings {
        auto_update_on_rejection: true,
        ..PushSettings::default()
    }
}

#[tokio::test]
async fn retries_are_bounded_by_max_attempts() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(ScriptedExecutor::new().then([(
        repo.clone(),
        outcome(RepoOutcomeKind::RejectedNoFastForward),
    )]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));

    let result = PushOrchestrator::new(
        plan(&[&repo]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&repo])),
        updater.clone(),
    )
    .with_settings(auto_update())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), MAX_PUSH_ATTEMPTS);
    assert_eq!(updater.calls().len(), MAX_PUSH_ATTEMPTS);
    let final_outcome = &result.outcomes[&repo];
    assert_eq!(final_outcome.kind, RepoOutcomeKind::RejectedNoFastForward);
    assert_eq!(final_outcome.update_outcome, Some(UpdateOutcome::CleanSuccess));
}

#[tokio::test]
async fn error_ends_the_run_without_updating() {
    let a = RepoId::new("/work/a");
    let b = RepoId::new("/work/b");
    let executor = Arc::new(ScriptedExecutor::new().then([
        (a.clone(), outcome(RepoOutcomeKind::Error)),
        (b.clone(), outcome(RepoOutcomeKind::RejectedNoFastForward)),
    ]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));

    let result = PushOrchestrator::new(
        plan(&[&a, &b]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&a, &b])),
        updater.clone(),
    )
    .with_settings(auto_update())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert!(updater.calls().is_empty());
    assert_eq!(result.outcomes[&a].kind, RepoOutcomeKind::Error);
    assert_eq!(result.outcomes[&b].kind, RepoOutcomeKind::RejectedNoFastForward);
    assert_eq!(result.outcomes[&b].update_outcome, None);
}

#[tokio::test]
async fn error_beside_a_success_ends_the_run() {
    let a = RepoId::new("/work/a");
    let b = RepoId::new("/work/b");
    let executor = Arc::new(ScriptedExecutor::new().then([
        (a.clone(), outcome(RepoOutcomeKind::Error)),
        (b.clone(), outcome(RepoOutcomeKind::Success)),
    ]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));

    let result = PushOrchestrator::new(
        plan(&[&a, &b]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&a, &b])),
        updater.clone(),
    )
    .with_settings(auto_update())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert!(updater.calls().is_empty());
    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.outcomes[&a].kind, RepoOutcomeKind::Error);
    assert_eq!(result.outcomes[&b].kind, RepoOutcomeKind::Success);
    assert!(!result.is_success());
}

#[tokio::test]
async fn stale_info_rejection_is_terminal() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(ScriptedExecutor::new().then([(
        repo.clone(),
        outcome(RepoOutcomeKind::RejectedStaleInfo),
    )]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));

    let result = PushOrchestrator::new(
        plan(&[&repo]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&repo])),
        updater.clone(),
    )
    .with_settings(auto_update())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert!(updater.calls().is_empty());
    assert_eq!(result.outcomes[&repo].kind, RepoOutcomeKind::RejectedStaleInfo);
}

#[tokio::test]
async fn unreached_repositories_are_not_pushed() {
    let a = RepoId::new("/work/a");
    let b = RepoId::new("/work/b");
    let c = RepoId::new("/work/c");
    let executor = Arc::new(ScriptedExecutor::new().then([
        (a.clone(), outcome(RepoOutcomeKind::Success)),
        (c.clone(), outcome(RepoOutcomeKind::UpToDate)),
    ]));
    let listener = Arc::new(RecordingListener::new());

    let result = PushOrchestrator::new(
        plan(&[&c, &b, &a]),
        PushOptions::default(),
        executor,
        Arc::new(FakeRepositoryState::new()),
        Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess)),
    )
    .with_listener(listener.clone())
    .run()
    .await
    .unwrap();

    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.outcomes[&a].kind, RepoOutcomeKind::Success);
    assert_eq!(result.outcomes[&b].kind, RepoOutcomeKind::NotPushed);
    assert_eq!(result.outcomes[&b].target_remote, "origin");
    assert_eq!(result.outcomes[&c].kind, RepoOutcomeKind::UpToDate);
    assert!(!result.is_success());

    let notified: Vec<RepoId> = listener.events().into_iter().map(|(r, _)| r).collect();
    assert_eq!(notified, vec![c, b, a]);
}

#[tokio::test]
async fn rejected_repository_is_updated_and_pushed_again() {
    let a = RepoId::new("/work/a");
    let b = RepoId::new("/work/b");

    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        &a,
        TransportOutput::ok([" \trefs/heads/main:refs/heads/main\tabc123..def456"]),
    );
    transport.script(
        &b,
        TransportOutput::failed(
            ["!\trefs/heads/main:refs/heads/main\t[rejected] (non-fast-forward)"],
            "error: failed to push some refs",
        ),
    );
    transport.script(
        &b,
        TransportOutput::ok([" \trefs/heads/main:refs/heads/main\t111aaa..222bbb"]),
    );

    let state = Arc::new(tracked_state(&[&a, &b]));
    state.set_range_size("abc123..def456", 3);
    state.set_range_size("111aaa..222bbb", 2);
    state.push_head(&b, "111aaa");
    state.push_head(&b, "222bbb");

    let options = PushOptions::default();
    let push_plan = plan(&[&a, &b]);
    let executor = Arc::new(GitPushExecutor::new(
        push_plan.clone(),
        options.clone(),
        transport.clone(),
        state.clone(),
    ));
    let updater = Arc::new(ScriptedUpdater::reporting(UpdateReport {
        outcome: UpdateOutcome::CleanSuccess,
        updated_files: vec!["/work/b/src/lib.rs".into()],
    }));
    let chosen = UpdateSettings {
        method: UpdateMethod::Rebase,
        update_all_roots: false,
    };
    let decider = Arc::new(ScriptedDecider::choosing(chosen));
    let store = Arc::new(MemorySettingsStore::new());

    let result = PushOrchestrator::new(push_plan, options, executor, state.clone(), updater.clone())
        .with_decider(decider.clone())
        .with_settings_store(store.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(transport.calls_for(&a), 1);
    assert_eq!(transport.calls_for(&b), 2);
    assert_eq!(updater.calls(), vec![(vec![b.clone()], UpdateMethod::Rebase, true)]);

    let prompts = decider.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].rejected, vec![b.clone()]);
    assert!(prompts[0].confirm_enabled);
    assert_eq!(store.saved(), vec![chosen]);

    assert!(result.is_success());
    assert_eq!(result.outcomes[&a].pushed_commits, Some(3));
    assert_eq!(result.outcomes[&a].update_outcome, None);
    assert_eq!(result.outcomes[&b].kind, RepoOutcomeKind::Success);
    assert_eq!(result.outcomes[&b].pushed_commits, Some(2));
    assert_eq!(
        result.outcomes[&b].update_outcome,
        Some(UpdateOutcome::CleanSuccess)
    );
    assert_eq!(result.updated_files.len(), 1);
    assert!(result.before_update_label.is_some());
    assert_eq!(result.updated_ranges[&b].to_string(), "111aaa..222bbb");
    assert!(state.refreshes().contains(&a));
}

#[tokio::test]
async fn cancelled_prompt_stops_the_run() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(ScriptedExecutor::new().then([(
        repo.clone(),
        outcome(RepoOutcomeKind::RejectedNoFastForward),
    )]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));
    let store = Arc::new(MemorySettingsStore::new());

    let result = PushOrchestrator::new(
        plan(&[&repo]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&repo])),
        updater.clone(),
    )
    .with_decider(Arc::new(ScriptedDecider::cancelling()))
    .with_settings_store(store.clone())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert!(updater.calls().is_empty());
    assert!(store.saved().is_empty());
    assert_eq!(result.outcomes[&repo].update_outcome, None);
    assert!(result.before_update_label.is_none());
}

#[tokio::test]
async fn force_push_never_updates() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(ScriptedExecutor::new().then([(
        repo.clone(),
        outcome(RepoOutcomeKind::RejectedNoFastForward),
    )]));
    let updater = Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess));

    for force_mode in [ForceMode::Force, ForceMode::ForceWithLease] {
        PushOrchestrator::new(
            plan(&[&repo]),
            PushOptions {
                force_mode,
                ..PushOptions::default()
            },
            executor.clone(),
            Arc::new(tracked_state(&[&repo])),
            updater.clone(),
        )
        .with_settings(auto_update())
        .run()
        .await
        .unwrap();
    }

    assert_eq!(executor.calls().len(), 2);
    assert!(updater.calls().is_empty());
}

#[tokio::test]
async fn rebase_over_merge_problem_offers_merge_and_keeps_settings() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(
        ScriptedExecutor::new()
            .then([(repo.clone(), outcome(RepoOutcomeKind::RejectedNoFastForward))])
            .then([(repo.clone(), outcome(RepoOutcomeKind::Success))]),
    );
    let updater = Arc::new(
        ScriptedUpdater::new(UpdateOutcome::CleanSuccess).with_rebase_over_merge_problem(),
    );
    let decider = Arc::new(ScriptedDecider::choosing(UpdateSettings {
        method: UpdateMethod::Merge,
        update_all_roots: false,
    }));
    let store = Arc::new(MemorySettingsStore::new());

    let result = PushOrchestrator::new(
        plan(&[&repo]),
        PushOptions::default(),
        executor,
        Arc::new(tracked_state(&[&repo])),
        updater.clone(),
    )
    .with_settings(PushSettings {
        update_method: UpdateMethod::Rebase,
        ..PushSettings::default()
    })
    .with_decider(decider.clone())
    .with_settings_store(store.clone())
    .run()
    .await
    .unwrap();

    let prompt = &decider.prompts()[0];
    assert!(prompt.rebase_over_merge_problem);
    assert!(!prompt.confirm_enabled);
    assert_eq!(prompt.defaults.method, UpdateMethod::Merge);
    assert!(store.saved().is_empty());
    assert_eq!(updater.calls()[0].1, UpdateMethod::Merge);
    assert!(result.is_success());
}

#[tokio::test]
async fn unclean_update_is_attached_and_terminal() {
    let repo = RepoId::new("/work/app");
    let executor = Arc::new(ScriptedExecutor::new().then([(
        repo.clone(),
        outcome(RepoOutcomeKind::RejectedNoFastForward),
    )]));

    let result = PushOrchestrator::new(
        plan(&[&repo]),
        PushOptions::default(),
        executor.clone(),
        Arc::new(tracked_state(&[&repo])),
        Arc::new(ScriptedUpdater::new(UpdateOutcome::Incomplete)),
    )
    .with_settings(auto_update())
    .run()
    .await
    .unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert_eq!(
        result.outcomes[&repo].update_outcome,
        Some(UpdateOutcome::Incomplete)
    );
    assert!(result.after_update_label.is_some());
}

#[tokio::test]
async fn deleted_ref_fails_the_run_after_refreshing() {
    let repo = RepoId::new("/work/app");
    let transport = Arc::new(ScriptedTransport::new());
    transport.script(
        &repo,
        TransportOutput::ok(["-\trefs/heads/main:refs/heads/main\t[deleted]"]),
    );
    let state = Arc::new(FakeRepositoryState::new());
    let options = PushOptions::default();
    let executor = Arc::new(GitPushExecutor::new(
        plan(&[&repo]),
        options.clone(),
        transport,
        state.clone(),
    ));
    let listener = Arc::new(RecordingListener::new());

    let err = PushOrchestrator::new(
        plan(&[&repo]),
        options,
        executor,
        state.clone(),
        Arc::new(ScriptedUpdater::new(UpdateOutcome::CleanSuccess)),
    )
    .with_listener(listener.clone())
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, PushError::UnsupportedOutcome { .. }));
    assert_eq!(state.refreshes(), vec![repo]);
    assert!(listener.events().is_empty());
}
