//! Pushflow CLI
//!
//! The `pushflow` command pushes several git repositories as one operation.
//!
//! ## Commands
//!
//! - `push`: push the current branch of each repository, updating and
//!   retrying repositories the remote rejects

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{ArgGroup, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};

use pushflow_core::push::collaborators::{
    NoSettingsStore, RepositoryState, SettingsStore, UpdateMethodDecider, UpdatePrompt,
};
use pushflow_core::push::{
    ForceMode, GitPushExecutor, PushOptions, PushOrchestrator, PushPlan, PushSource, PushSpec,
    PushTarget, RepoId, RepoOutcomeKind, TagMode,
};
use pushflow_core::{
    GitCli, GitUpdater, JsonSettingsStore, PushSettings, UpdateMethod, UpdateSettings,
};

#[derive(Parser)]
#[command(name = "pushflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Push several git repositories as one operation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push the current branch of each repository
    #[command(group(ArgGroup::new("forcing").args(["force", "force_with_lease"])))]
    #[command(group(ArgGroup::new("tag_push").args(["tags", "follow_tags"])))]
    Push {
        /// Repository roots (default: current directory)
        #[arg(short, long = "repo")]
        repos: Vec<PathBuf>,

        /// Remote to push to (default: the tracked remote, else origin)
        #[arg(long)]
        remote: Option<String>,

        /// Remote branch to push to (default: the tracked branch, else the local name)
        #[arg(short, long)]
        branch: Option<String>,

        /// Force the push
        #[arg(short, long)]
        force: bool,

        /// Force only if the remote is where we last saw it
        #[arg(long)]
        force_with_lease: bool,

        /// Push all tags
        #[arg(long)]
        tags: bool,

        /// Push annotated tags reachable from the pushed commits
        #[arg(long)]
        follow_tags: bool,

        /// Skip pre-push hooks
        #[arg(long)]
        no_verify: bool,

        /// Update rejected branches without asking
        #[arg(long, env = "PUSHFLOW_AUTO_UPDATE")]
        auto_update: bool,

        /// How rejected branches are updated: merge or rebase
        #[arg(long, env = "PUSHFLOW_UPDATE_METHOD")]
        update_method: Option<UpdateMethod>,

        /// Update every given repository when any of them is rejected
        #[arg(long, env = "PUSHFLOW_UPDATE_ALL_ROOTS")]
        update_all_roots: bool,

        /// Settings file; the chosen update method is saved here
        #[arg(long, env = "PUSHFLOW_SETTINGS")]
        settings: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        output_json: bool,
    },
}

/// Options of the `push` command, once parsed.
struct PushArgs {
    repos: Vec<PathBuf>,
    remote: Option<String>,
    branch: Option<String>,
    options: PushOptions,
    auto_update: bool,
    update_method: Option<UpdateMethod>,
    update_all_roots: bool,
    settings: Option<PathBuf>,
    output_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    pushflow_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Push {
            repos,
            remote,
            branch,
            force,
            force_with_lease,
            tags,
            follow_tags,
            no_verify,
            auto_update,
            update_method,
            update_all_roots,
            settings,
            output_json,
        } => {
            let force_mode = if force {
                ForceMode::Force
            } else if force_with_lease {
                ForceMode::ForceWithLease
            } else {
                ForceMode::None
            };
            let tag_mode = if tags {
                Some(TagMode::All)
            } else if follow_tags {
                Some(TagMode::FollowTags)
            } else {
                None
            };
            cmd_push(PushArgs {
                repos,
                remote,
                branch,
                options: PushOptions {
                    force_mode,
                    tag_mode,
                    skip_hooks: no_verify,
                },
                auto_update,
                update_method,
                update_all_roots,
                settings,
                output_json,
            })
            .await
        }
    }
}

async fn cmd_push(args: PushArgs) -> Result<()> {
    let roots = if args.repos.is_empty() {
        vec![std::env::current_dir().context("Failed to get current directory")?]
    } else {
        args.repos.clone()
    };
    let mut repos = Vec::with_capacity(roots.len());
    for root in &roots {
        let root = root
            .canonicalize()
            .with_context(|| format!("Repository not found: {}", root.display()))?;
        repos.push(RepoId::new(root));
    }
    let repos = order_by_depth(repos);

    let (mut settings, store): (PushSettings, Arc<dyn SettingsStore>) = match &args.settings {
        Some(path) => {
            let store = JsonSettingsStore::new(path);
            let loaded = store
                .load()
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            (loaded, Arc::new(store))
        }
        None => (PushSettings::default(), Arc::new(NoSettingsStore)),
    };
    settings.auto_update_on_rejection |= args.auto_update;
    settings.update_all_roots |= args.update_all_roots;
    if let Some(method) = args.update_method {
        settings.update_method = method;
    }

    let git = Arc::new(GitCli::new(repos.clone()));
    let mut entries = Vec::with_capacity(repos.len());
    for repo in &repos {
        let spec = discover_spec(git.as_ref(), repo, args.remote.as_deref(), args.branch.as_deref())
            .await
            .with_context(|| format!("Cannot determine what to push in {repo}"))?;
        info!(repo = %repo, refspec = %spec.refspec(false), "planned push");
        entries.push((repo.clone(), spec));
    }
    let plan = PushPlan::new(entries);

    let executor = Arc::new(GitPushExecutor::new(
        plan.clone(),
        args.options.clone(),
        git.clone(),
        git.clone(),
    ));
    let orchestrator = PushOrchestrator::new(
        plan,
        args.options,
        executor,
        git,
        Arc::new(GitUpdater::new()),
    )
    .with_settings(settings)
    .with_settings_store(store)
    .with_decider(Arc::new(StdinDecider));

    let progress = orchestrator.progress().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current step");
            progress.cancel();
        }
    });

    let result = orchestrator.run().await.context("Push failed")?;

    if args.output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.summary());
    }

    if result.was_updated() {
        info!(
            files = result.updated_files.len(),
            "rejected repositories were updated before pushing again"
        );
    }
    if !result.is_success() {
        bail!(
            "{} of {} repositories were not pushed ({} rejected, {} with errors, {} not attempted)",
            result.outcomes.len() - result.outcomes.values().filter(|o| o.kind.is_pushed()).count(),
            result.outcomes.len(),
            result.rejected_count(),
            result.count(RepoOutcomeKind::Error),
            result.count(RepoOutcomeKind::NotPushed)
        );
    }
    Ok(())
}

/// Work out source and target for one repository.
///
/// Pushes the checked-out branch to the branch it tracks. Without tracking,
/// the local branch name is pushed to `remote` (default `origin`) as a new
/// branch unless the remote-tracking ref already exists.
async fn discover_spec(
    git: &dyn RepositoryState,
    repo: &RepoId,
    remote: Option<&str>,
    branch: Option<&str>,
) -> Result<PushSpec> {
    let current = git.current_branch(repo).await?;
    let tracking = match &current {
        Some(name) => git.tracking_info(repo, name).await?,
        None => None,
    };

    let source = match &current {
        Some(name) => PushSource::branch(name.as_str()),
        None => PushSource::DetachedHead,
    };
    let remote = remote
        .map(str::to_string)
        .or_else(|| tracking.as_ref().map(|t| t.remote.clone()))
        .unwrap_or_else(|| "origin".to_string());
    let target_branch = match (branch, &tracking, &current) {
        (Some(b), _, _) => b.to_string(),
        (None, Some(t), _) if t.remote == remote => t.remote_branch.clone(),
        (None, _, Some(name)) => name.clone(),
        (None, _, None) => bail!("HEAD is detached; pass --branch to choose the target"),
    };

    let target = PushTarget::new(remote, target_branch);
    let exists = git.remote_tracking_tip(repo, &target).await?.is_some();
    let target = if exists { target } else { target.new_branch() };
    Ok(PushSpec::new(source, target))
}

/// Parents before the repositories nested in them; stable otherwise.
fn order_by_depth(mut repos: Vec<RepoId>) -> Vec<RepoId> {
    let mut seen = HashSet::new();
    repos.retain(|r| seen.insert(r.clone()));
    repos.sort_by_key(|r| r.path().components().count());
    repos
}

/// Asks on the terminal which update method to use.
struct StdinDecider;

#[async_trait]
impl UpdateMethodDecider for StdinDecider {
    async fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateSettings> {
        let mut stderr = tokio::io::stderr();
        let names: Vec<String> = prompt.rejected.iter().map(|r| display_name(r.path())).collect();
        let mut text = format!(
            "Push rejected in {}: the remote has changes you do not have.\n",
            names.join(", ")
        );
        if prompt.rebase_over_merge_problem {
            text.push_str("Rebasing would flatten local merge commits; merging is recommended.\n");
        }
        let default = prompt.defaults.method.as_str();
        if prompt.confirm_enabled {
            text.push_str(&format!("Update with [m]erge or [r]ebase, or [c]ancel? [{default}] "));
        } else {
            text.push_str(&format!("Update with [m]erge, or [c]ancel? [{default}] "));
        }
        stderr.write_all(text.as_bytes()).await.ok()?;
        stderr.flush().await.ok()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .ok()?;
        let method = parse_choice(&line, prompt.defaults.method, prompt.confirm_enabled)?;
        Some(UpdateSettings {
            method,
            ..prompt.defaults
        })
    }
}

/// `None` cancels; an empty answer keeps the default.
fn parse_choice(answer: &str, default: UpdateMethod, rebase_allowed: bool) -> Option<UpdateMethod> {
    match answer.trim().to_lowercase().as_str() {
        "" => Some(default),
        "m" | "merge" => Some(UpdateMethod::Merge),
        "r" | "rebase" if rebase_allowed => Some(UpdateMethod::Rebase),
        _ => None,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
