//! Package descriptors and graph nodes.
//!
//! - [`RawPackage`] - a package as loaded from disk: sources plus the import
//!   paths it names, not yet linked to other packages
//! - [`Package`] - a node in the assembled graph, whose dependencies are
//!   references to other nodes

use std::path::PathBuf;

use petgraph::graph::NodeIndex;
use serde::Serialize;

/// Stable reference to a node in a [`PackageGraph`](crate::graph::PackageGraph).
pub type PackageId = NodeIndex;

/// Structural flags fixed when a package is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PackageFlags {
  /// Part of the toolchain's standard library.
  pub standard: bool,
  /// Built only for tests; its object is never installed.
  pub test: bool,
  /// Entry-point package that links into an executable.
  pub main: bool,
}

/// A package descriptor as loaded from a source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawPackage {
  /// Logical import path. Loaders leave it empty; whoever knows where the
  /// directory sits in the import namespace stamps it.
  pub import_path: String,
  /// Directory containing the sources.
  pub dir: PathBuf,
  /// Source file names relative to `dir`, sorted.
  pub files: Vec<String>,
  /// Imported paths in first-seen order, without duplicates.
  pub imports: Vec<String>,
  pub flags: PackageFlags,
}

impl RawPackage {
  pub fn with_import_path(mut self, import_path: impl Into<String>) -> Self {
    self.import_path = import_path.into();
    self
  }
}

/// A node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub import_path: String,
  pub dir: PathBuf,
  pub files: Vec<String>,
  /// Direct dependencies in declaration order. Standard-library imports are not represented.
  pub deps: Vec<PackageId>,
  pub flags: PackageFlags,
}

impl Package {
  pub fn new(import_path: impl Into<String>, dir: PathBuf, files: Vec<String>, flags: PackageFlags) -> Self {
    Self {
      import_path: import_path.into(),
      dir,
      files,
      deps: Vec::new(),
      flags,
    }
  }

  /// Last element of the import path; names the linked binary.
  pub fn name(&self) -> &str {
    self.import_path.rsplit('/').next().unwrap_or(&self.import_path)
  }

  pub fn is_main(&self) -> bool {
    self.flags.main
  }

  pub fn is_standard(&self) -> bool {
    self.flags.standard
  }

  pub fn is_test(&self) -> bool {
    self.flags.test
  }

  /// Absolute paths of the package's source files.
  pub fn source_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
    self.files.iter().map(|file| self.dir.join(file))
  }
}
