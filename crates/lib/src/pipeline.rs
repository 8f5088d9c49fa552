//! The build pipeline: discover, resolve, assemble, check, schedule, run.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::DependencyCache;
use crate::cache::fetch::Fetcher;
use crate::config::{Config, ConfigError};
use crate::context::BuildContext;
use crate::graph::{self, GraphError};
use crate::loader::{self, LoadError};
use crate::resolve::{ResolveError, Resolver};
use crate::schedule::{ActionKind, ExecuteError, RunSummary, Scheduler};
use crate::stale::{StaleError, StaleReason, compute_staleness};
use crate::toolchain::Toolchain;

/// Any error that aborts a build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Load(#[from] LoadError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Stale(#[from] StaleError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// Compute and run the plan.
  Build,
  /// Compute the plan without running it.
  Plan,
}

/// One package in the computed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
  pub import_path: String,
  pub action: ActionKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stale: Option<StaleReason>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
  /// Build roots in the order they were scheduled.
  pub roots: Vec<String>,
  /// Packages in the graph.
  pub packages: usize,
  /// Packages resolved from pinned dependencies.
  pub external: usize,
  /// Scheduled actions, dependencies first.
  pub plan: Vec<PlanEntry>,
  /// What running the plan did; absent in plan mode.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<RunSummary>,
}

/// Build (or plan) the project described by `config`.
pub fn build(
  config: &Config,
  ctx: &BuildContext,
  toolchain: &dyn Toolchain,
  fetcher: Box<dyn Fetcher>,
  mode: Mode,
) -> Result<BuildOutcome, BuildError> {
  let local = loader::discover(&config.root, &config.project, &ctx.constraints())?;
  if local.is_empty() {
    warn!(root = %config.root.display(), "no packages found");
  }

  let mut resolver = Resolver::new(
    config.dependencies.clone(),
    DependencyCache::new(&ctx.cachedir, fetcher),
    ctx.constraints(),
  );
  let external = resolver.resolve_closure(&local)?;
  let external_count = external.len();

  let roots = graph::select_roots(&config.project, &local);
  let graph = graph::assemble(local, external, &roots)?;
  let staleness = compute_staleness(&graph, ctx, graph.roots())?;
  info!(
    packages = graph.len(),
    stale = staleness.stale_count(),
    target = %ctx.target,
    "checked packages"
  );

  let mut scheduler = Scheduler::new(&graph, &staleness, toolchain);
  let root = scheduler.schedule(graph.roots());
  let plan = scheduler
    .plan()
    .iter()
    .map(|action| PlanEntry {
      import_path: action.import_path().to_string(),
      action: action.kind(),
      stale: action.package().and_then(|id| staleness.reason(id)).cloned(),
    })
    .collect();

  let summary = match mode {
    Mode::Build => Some(scheduler.run(&root)?),
    Mode::Plan => None,
  };

  Ok(BuildOutcome {
    roots,
    packages: graph.len(),
    external: external_count,
    plan,
    summary,
  })
}
