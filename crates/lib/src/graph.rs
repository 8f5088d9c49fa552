//! Assembling the package dependency graph.
//!
//! Raw descriptors from discovery and resolution are indexed by import path
//! and walked depth-first from the roots. A package's imports are turned into
//! nodes before the package itself, so every node only ever points at nodes
//! that are already complete. Each import path becomes exactly one node, which
//! is what collapses diamond dependencies into a single compilation.
//!
//! Standard-library and synthetic imports are not represented: they are
//! treated as prebuilt leaves outside the graph.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::DiGraph;
use petgraph::visit::DfsPostOrder;
use thiserror::Error;
use tracing::{debug, trace};

use crate::package::{Package, PackageId, RawPackage};
use crate::stdlib;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("package {import_path} not loaded (imported by {importer})")]
  NotLoaded { import_path: String, importer: String },

  #[error("build root {import_path} is not a loaded package")]
  UnknownRoot { import_path: String },

  #[error("import cycle: {}", chain.join(" -> "))]
  Cycle { chain: Vec<String> },

  #[error("package {import_path} loaded twice ({first} and {second})")]
  Duplicate {
    import_path: String,
    first: String,
    second: String,
  },
}

/// The assembled, acyclic package graph.
///
/// Edges point from a package to its direct dependencies and carry the
/// position of the import in the package's declaration order.
#[derive(Debug, Default)]
pub struct PackageGraph {
  graph: DiGraph<Package, usize>,
  index: HashMap<String, PackageId>,
  roots: Vec<PackageId>,
}

impl PackageGraph {
  pub fn package(&self, id: PackageId) -> &Package {
    &self.graph[id]
  }

  pub fn lookup(&self, import_path: &str) -> Option<PackageId> {
    self.index.get(import_path).copied()
  }

  /// Direct dependencies of `id` in declaration order.
  pub fn dependencies(&self, id: PackageId) -> &[PackageId] {
    &self.graph[id].deps
  }

  /// Packages that import `id` directly.
  pub fn dependents(&self, id: PackageId) -> Vec<PackageId> {
    let mut dependents: Vec<_> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
    dependents.sort();
    dependents.dedup();
    dependents
  }

  /// Every package reachable from `id`, excluding `id`, dependencies first.
  pub fn transitive_deps(&self, id: PackageId) -> Vec<PackageId> {
    let mut dfs = DfsPostOrder::new(&self.graph, id);
    let mut reached = Vec::new();
    while let Some(next) = dfs.next(&self.graph) {
      if next != id {
        reached.push(next);
      }
    }
    reached
  }

  pub fn roots(&self) -> &[PackageId] {
    &self.roots
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// All nodes in construction order (every package after its dependencies).
  pub fn packages(&self) -> impl Iterator<Item = (PackageId, &Package)> {
    self.graph.node_indices().map(move |id| (id, &self.graph[id]))
  }
}

/// Pick the build roots among the local packages.
///
/// The project's own top-level package comes first when it has sources,
/// followed by every main package. Without either, every local package is a
/// root.
pub fn select_roots(project: &str, local: &[RawPackage]) -> Vec<String> {
  let mut roots: Vec<String> = Vec::new();
  if local.iter().any(|pkg| pkg.import_path == project) {
    roots.push(project.to_string());
  }
  for pkg in local {
    if pkg.flags.main && pkg.import_path != project {
      roots.push(pkg.import_path.clone());
    }
  }
  if roots.is_empty() {
    roots = local.iter().map(|pkg| pkg.import_path.clone()).collect();
  }
  roots
}

/// Build the graph reachable from `roots` out of the loaded descriptors.
pub fn assemble(
  local: Vec<RawPackage>,
  external: Vec<RawPackage>,
  roots: &[String],
) -> Result<PackageGraph, GraphError> {
  let mut raw: HashMap<String, RawPackage> = HashMap::new();
  for pkg in local.into_iter().chain(external) {
    if let Some(existing) = raw.get(&pkg.import_path) {
      return Err(GraphError::Duplicate {
        import_path: pkg.import_path.clone(),
        first: existing.dir.display().to_string(),
        second: pkg.dir.display().to_string(),
      });
    }
    raw.insert(pkg.import_path.clone(), pkg);
  }

  let mut assembler = Assembler {
    raw,
    marks: HashMap::new(),
    stack: Vec::new(),
    out: PackageGraph::default(),
  };

  for root in roots {
    if !assembler.raw.contains_key(root) {
      return Err(GraphError::UnknownRoot {
        import_path: root.clone(),
      });
    }
    let id = assembler.visit(root, root)?;
    if !assembler.out.roots.contains(&id) {
      assembler.out.roots.push(id);
    }
  }

  debug!(packages = assembler.out.len(), roots = assembler.out.roots.len(), "assembled package graph");
  Ok(assembler.out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  InProgress,
  Done(PackageId),
}

struct Assembler {
  raw: HashMap<String, RawPackage>,
  marks: HashMap<String, Mark>,
  /// Import paths currently being visited, outermost first.
  stack: Vec<String>,
  out: PackageGraph,
}

impl Assembler {
  fn visit(&mut self, import_path: &str, importer: &str) -> Result<PackageId, GraphError> {
    match self.marks.get(import_path) {
      Some(Mark::Done(id)) => return Ok(*id),
      Some(Mark::InProgress) => {
        let start = self.stack.iter().position(|p| p == import_path).unwrap_or(0);
        let mut chain = self.stack[start..].to_vec();
        chain.push(import_path.to_string());
        return Err(GraphError::Cycle { chain });
      }
      None => {}
    }

    let Some(raw) = self.raw.get(import_path) else {
      return Err(GraphError::NotLoaded {
        import_path: import_path.to_string(),
        importer: importer.to_string(),
      });
    };
    let imports: Vec<String> = raw.imports.iter().filter(|i| !stdlib::is_elided(i)).cloned().collect();

    self.marks.insert(import_path.to_string(), Mark::InProgress);
    self.stack.push(import_path.to_string());

    let mut deps = Vec::with_capacity(imports.len());
    for import in &imports {
      deps.push(self.visit(import, import_path)?);
    }

    self.stack.pop();

    let raw = &self.raw[import_path];
    let mut package = Package::new(import_path, raw.dir.clone(), raw.files.clone(), raw.flags);
    package.deps = deps.clone();
    let id = self.out.graph.add_node(package);
    for (position, dep) in deps.into_iter().enumerate() {
      self.out.graph.add_edge(id, dep, position);
    }
    trace!(import_path, deps = imports.len(), "added package node");

    self.out.index.insert(import_path.to_string(), id);
    self.marks.insert(import_path.to_string(), Mark::Done(id));
    Ok(id)
  }
}
