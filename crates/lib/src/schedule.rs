//! Turning the package graph into build actions and running them.
//!
//! The [`Scheduler`] walks the graph top-down from the roots and builds one
//! [`BuildAction`] per import path, dependencies first. Actions are memoized by
//! import path, so a package reached through several parents is represented
//! (and executed) exactly once. A package that is up to date becomes a no-op
//! action and its dependencies are not visited at all: freshness already
//! implies a fresh dependency closure.
//!
//! Running an action runs its dependency actions in declaration order, stops at
//! the first failure, then compiles the package and links it if it is a main
//! package. Every action remembers that it ran, so running it again within the
//! same process does nothing.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::PackageGraph;
use crate::package::PackageId;
use crate::stale::Staleness;
use crate::toolchain::{Toolchain, ToolchainError};

#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("{step} {import_path}: {source}")]
  Toolchain {
    step: &'static str,
    import_path: String,
    #[source]
    source: ToolchainError,
  },

  #[error("{import_path} failed earlier in this run")]
  AlreadyFailed { import_path: String },
}

/// What an action does when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
  /// The package is fresh; nothing to do.
  UpToDate,
  /// Compile the package, then link it when `link` is set.
  Compile { link: bool },
  /// Run the dependency actions only; used to gather several roots.
  Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
  Pending,
  Succeeded,
  Failed,
}

/// One unit of work in the build plan.
#[derive(Debug)]
pub struct BuildAction {
  import_path: String,
  package: Option<PackageId>,
  kind: ActionKind,
  deps: Vec<Rc<BuildAction>>,
  state: Cell<RunState>,
}

impl BuildAction {
  pub fn import_path(&self) -> &str {
    &self.import_path
  }

  /// The package this action builds; `None` for groups.
  pub fn package(&self) -> Option<PackageId> {
    self.package
  }

  pub fn kind(&self) -> ActionKind {
    self.kind
  }

  /// Actions that run before this one, in declaration order.
  pub fn dependencies(&self) -> &[Rc<BuildAction>] {
    &self.deps
  }

  /// Whether the action has completed successfully in this process.
  pub fn is_done(&self) -> bool {
    self.state.get() == RunState::Succeeded
  }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  /// Packages compiled, in execution order.
  pub compiled: Vec<String>,
  /// Main packages linked, in execution order.
  pub linked: Vec<String>,
  /// Packages found up to date.
  pub up_to_date: Vec<String>,
}

/// Builds and runs the action plan for one graph.
pub struct Scheduler<'a> {
  graph: &'a PackageGraph,
  staleness: &'a Staleness,
  toolchain: &'a dyn Toolchain,
  memo: HashMap<String, Rc<BuildAction>>,
  /// Package actions in construction order.
  order: Vec<Rc<BuildAction>>,
}

impl<'a> Scheduler<'a> {
  pub fn new(graph: &'a PackageGraph, staleness: &'a Staleness, toolchain: &'a dyn Toolchain) -> Self {
    Self {
      graph,
      staleness,
      toolchain,
      memo: HashMap::new(),
      order: Vec::new(),
    }
  }

  /// One action that builds every package in `roots`.
  pub fn schedule(&mut self, roots: &[PackageId]) -> Rc<BuildAction> {
    let deps = roots.iter().map(|root| self.action_for(*root)).collect();
    Rc::new(BuildAction {
      import_path: String::new(),
      package: None,
      kind: ActionKind::Group,
      deps,
      state: Cell::new(RunState::Pending),
    })
  }

  /// The action for package `id`, constructing it on first request.
  pub fn action_for(&mut self, id: PackageId) -> Rc<BuildAction> {
    let graph = self.graph;
    let package = graph.package(id);
    if let Some(action) = self.memo.get(&package.import_path) {
      return Rc::clone(action);
    }

    let action = if self.staleness.is_stale(id) {
      let deps = graph.dependencies(id).iter().map(|dep| self.action_for(*dep)).collect();
      BuildAction {
        import_path: package.import_path.clone(),
        package: Some(id),
        kind: ActionKind::Compile {
          link: package.is_main(),
        },
        deps,
        state: Cell::new(RunState::Pending),
      }
    } else {
      BuildAction {
        import_path: package.import_path.clone(),
        package: Some(id),
        kind: ActionKind::UpToDate,
        deps: Vec::new(),
        state: Cell::new(RunState::Pending),
      }
    };
    debug!(import_path = %action.import_path, kind = ?action.kind, "scheduled");

    let action = Rc::new(action);
    self.memo.insert(package.import_path.clone(), Rc::clone(&action));
    self.order.push(Rc::clone(&action));
    action
  }

  /// Package actions in construction order, dependencies before dependents.
  pub fn plan(&self) -> &[Rc<BuildAction>] {
    &self.order
  }

  /// Run `action` and everything it depends on.
  pub fn run(&self, action: &BuildAction) -> Result<RunSummary, ExecuteError> {
    let mut summary = RunSummary::default();
    self.execute(action, &mut summary)?;
    info!(
      compiled = summary.compiled.len(),
      linked = summary.linked.len(),
      up_to_date = summary.up_to_date.len(),
      "build finished"
    );
    Ok(summary)
  }

  fn execute(&self, action: &BuildAction, summary: &mut RunSummary) -> Result<(), ExecuteError> {
    match action.state.get() {
      RunState::Succeeded => return Ok(()),
      RunState::Failed => {
        return Err(ExecuteError::AlreadyFailed {
          import_path: action.import_path.clone(),
        });
      }
      RunState::Pending => {}
    }

    for dep in &action.deps {
      self.execute(dep, summary)?;
    }

    if let Err(err) = self.perform(action, summary) {
      action.state.set(RunState::Failed);
      return Err(err);
    }
    action.state.set(RunState::Succeeded);
    Ok(())
  }

  fn perform(&self, action: &BuildAction, summary: &mut RunSummary) -> Result<(), ExecuteError> {
    let Some(id) = action.package else {
      return Ok(());
    };
    let package = self.graph.package(id);

    match action.kind {
      ActionKind::Group => {}
      ActionKind::UpToDate => {
        debug!(import_path = %package.import_path, "up to date");
        summary.up_to_date.push(package.import_path.clone());
      }
      ActionKind::Compile { link } => {
        self.toolchain.compile(package).map_err(|source| ExecuteError::Toolchain {
          step: "compile",
          import_path: package.import_path.clone(),
          source,
        })?;
        summary.compiled.push(package.import_path.clone());

        if link {
          self.toolchain.link(package).map_err(|source| ExecuteError::Toolchain {
            step: "link",
            import_path: package.import_path.clone(),
            source,
          })?;
          summary.linked.push(package.import_path.clone());
        }
      }
    }
    Ok(())
  }
}
