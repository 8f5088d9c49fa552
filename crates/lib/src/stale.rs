//! Deciding which packages need rebuilding.
//!
//! The engine walks the graph bottom-up and records, per node, whether it is
//! fresh or why it is stale. The result is a [`Staleness`] overlay keyed by
//! [`PackageId`]; the graph itself is never modified.
//!
//! A node is stale when any of its dependencies is stale, so a fresh node
//! guarantees its whole dependency closure is fresh too.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::context::BuildContext;
use crate::graph::PackageGraph;
use crate::package::PackageId;
use crate::stdlib;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StaleError {
  #[error("import cycle while checking staleness: {}", chain.join(" -> "))]
  Cycle { chain: Vec<String> },
}

/// Why a package has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StaleReason {
  /// A dependency is stale.
  Dependency(String),
  /// Rebuilds were forced.
  Forced,
  /// Test-scoped packages have no installed object.
  TestScope,
  /// The compiled object does not exist.
  ObjectMissing,
  /// A dependency's object is newer than this package's object.
  DependencyNewer(String),
  /// The linked binary does not exist.
  BinaryMissing,
  /// The linked binary is older than the package's object.
  BinaryOutdated,
  /// A source file is newer than the compiled object.
  SourceNewer(String),
  /// A file could not be inspected.
  Unreadable(PathBuf),
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StaleReason::Dependency(dep) => write!(f, "dependency {dep} is stale"),
      StaleReason::Forced => write!(f, "rebuild forced"),
      StaleReason::TestScope => write!(f, "test package"),
      StaleReason::ObjectMissing => write!(f, "object missing"),
      StaleReason::DependencyNewer(dep) => write!(f, "object of {dep} is newer"),
      StaleReason::BinaryMissing => write!(f, "binary missing"),
      StaleReason::BinaryOutdated => write!(f, "binary older than object"),
      StaleReason::SourceNewer(file) => write!(f, "{file} modified"),
      StaleReason::Unreadable(path) => write!(f, "cannot stat {}", path.display()),
    }
  }
}

/// Per-package staleness verdicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Staleness {
  verdicts: HashMap<PackageId, Option<StaleReason>>,
}

impl Staleness {
  /// Whether `id` must be rebuilt. Packages never checked count as stale.
  pub fn is_stale(&self, id: PackageId) -> bool {
    !matches!(self.verdicts.get(&id), Some(None))
  }

  /// The reason `id` is stale, or `None` when it is fresh or was never checked.
  pub fn reason(&self, id: PackageId) -> Option<&StaleReason> {
    self.verdicts.get(&id).and_then(|v| v.as_ref())
  }

  /// Number of packages checked.
  pub fn len(&self) -> usize {
    self.verdicts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.verdicts.is_empty()
  }

  pub fn stale_count(&self) -> usize {
    self.verdicts.values().filter(|v| v.is_some()).count()
  }
}

/// Compute the staleness of every package reachable from `roots`.
pub fn compute_staleness(
  graph: &PackageGraph,
  ctx: &BuildContext,
  roots: &[PackageId],
) -> Result<Staleness, StaleError> {
  let mut engine = StalenessEngine::new(graph, ctx);
  for root in roots {
    engine.check(*root)?;
  }
  debug!(
    checked = engine.result.len(),
    stale = engine.result.stale_count(),
    "computed staleness"
  );
  Ok(engine.result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  InProgress,
  Done,
}

/// Bottom-up staleness walk owning its memo tables.
pub struct StalenessEngine<'a> {
  graph: &'a PackageGraph,
  ctx: &'a BuildContext,
  marks: HashMap<PackageId, Mark>,
  stack: Vec<PackageId>,
  result: Staleness,
}

impl<'a> StalenessEngine<'a> {
  pub fn new(graph: &'a PackageGraph, ctx: &'a BuildContext) -> Self {
    Self {
      graph,
      ctx,
      marks: HashMap::new(),
      stack: Vec::new(),
      result: Staleness::default(),
    }
  }

  /// Check `id` and everything it depends on. Returns whether `id` is stale.
  pub fn check(&mut self, id: PackageId) -> Result<bool, StaleError> {
    match self.marks.get(&id) {
      Some(Mark::Done) => return Ok(self.result.is_stale(id)),
      Some(Mark::InProgress) => {
        let start = self.stack.iter().position(|p| *p == id).unwrap_or(0);
        let mut chain: Vec<String> = self.stack[start..]
          .iter()
          .map(|p| self.graph.package(*p).import_path.clone())
          .collect();
        chain.push(self.graph.package(id).import_path.clone());
        return Err(StaleError::Cycle { chain });
      }
      None => {}
    }

    self.marks.insert(id, Mark::InProgress);
    self.stack.push(id);

    let mut stale_dep = None;
    for dep in self.graph.dependencies(id) {
      if self.check(*dep)? && stale_dep.is_none() {
        stale_dep = Some(*dep);
      }
    }

    self.stack.pop();

    let verdict = match stale_dep {
      Some(dep) => Some(StaleReason::Dependency(self.graph.package(dep).import_path.clone())),
      None => self.own_verdict(id),
    };

    let pkg = self.graph.package(id);
    match &verdict {
      Some(reason) => debug!(import_path = %pkg.import_path, %reason, "stale"),
      None => trace!(import_path = %pkg.import_path, "up to date"),
    }

    let stale = verdict.is_some();
    self.result.verdicts.insert(id, verdict);
    self.marks.insert(id, Mark::Done);
    Ok(stale)
  }

  /// Staleness by this package's own criteria, assuming every dependency is fresh.
  fn own_verdict(&self, id: PackageId) -> Option<StaleReason> {
    let pkg = self.graph.package(id);
    let options = &self.ctx.options;

    if stdlib::is_synthetic(&pkg.import_path) {
      return None;
    }
    if options.force && !pkg.is_standard() {
      return Some(StaleReason::Forced);
    }
    if pkg.is_test() {
      return Some(StaleReason::TestScope);
    }
    if pkg.is_standard() && !self.ctx.is_cross_compiling() {
      return None;
    }

    let object = self.ctx.object_path(&pkg.import_path);
    let object_time = match modified(&object) {
      Ok(Some(time)) => time,
      Ok(None) => return Some(StaleReason::ObjectMissing),
      Err(reason) => return Some(reason),
    };

    for dep in self.graph.dependencies(id) {
      let dep_pkg = self.graph.package(*dep);
      if stdlib::is_synthetic(&dep_pkg.import_path) {
        continue;
      }
      let dep_object = self.ctx.object_path(&dep_pkg.import_path);
      match modified(&dep_object) {
        Ok(Some(time)) if time > object_time => {
          return Some(StaleReason::DependencyNewer(dep_pkg.import_path.clone()));
        }
        Ok(Some(_)) => {}
        Ok(None) => return Some(StaleReason::DependencyNewer(dep_pkg.import_path.clone())),
        Err(reason) => return Some(reason),
      }
    }

    if pkg.is_main() {
      let binary = self.ctx.binary_path(pkg);
      match modified(&binary) {
        Ok(Some(time)) if time < object_time => return Some(StaleReason::BinaryOutdated),
        Ok(Some(_)) => {}
        Ok(None) => return Some(StaleReason::BinaryMissing),
        Err(reason) => return Some(reason),
      }
    }

    for (file, path) in pkg.files.iter().zip(pkg.source_paths()) {
      match modified(&path) {
        Ok(Some(time)) if time > object_time => return Some(StaleReason::SourceNewer(file.clone())),
        Ok(Some(_)) => {}
        Ok(None) => {
          warn!(file = %path.display(), "source file vanished, rebuilding");
          return Some(StaleReason::Unreadable(path));
        }
        Err(reason) => return Some(reason),
      }
    }

    None
  }
}

/// Modification time of `path`, `None` when it does not exist.
///
/// Any other failure is logged and reported as the stale reason.
fn modified(path: &Path) -> Result<Option<SystemTime>, StaleReason> {
  let probe = fs::metadata(path).and_then(|meta| meta.modified());
  match probe {
    Ok(time) => {
      trace!(path = %path.display(), "probed mtime");
      Ok(Some(time))
    }
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(err) => {
      warn!(path = %path.display(), error = %err, "cannot stat, treating as stale");
      Err(StaleReason::Unreadable(path.to_path_buf()))
    }
  }
}
