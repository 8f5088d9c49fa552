//! Process-wide build configuration.
//!
//! A [`BuildContext`] is created once per invocation and shared by reference
//! with every component. It also owns the deterministic artifact layout: where
//! a package's compiled object lives and where a main package's binary goes.

use std::path::{Path, PathBuf};

use crate::constraint::Constraints;
use crate::consts::{BIN_DIR_NAME, CACHE_DIR_NAME, OBJECT_EXT, STATE_DIR_NAME};
use crate::package::Package;
use crate::platform::Platform;

/// Optional build switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
  /// Treat every non-standard package as stale.
  pub force: bool,
  /// Build with the race detector instrumentation.
  pub race: bool,
  /// Extra arguments passed to the compiler.
  pub gcflags: Vec<String>,
  /// Extra arguments passed to the linker.
  pub ldflags: Vec<String>,
  /// Build tags. They select `//go:build`-constrained files and name the
  /// binary.
  pub tags: Vec<String>,
}

/// Immutable configuration for one build.
#[derive(Debug, Clone)]
pub struct BuildContext {
  /// Platform the artifacts are built for.
  pub target: Platform,
  /// Platform the build runs on.
  pub host: Platform,
  /// Scratch directory for intermediate files.
  pub workdir: PathBuf,
  /// Root of the compiled package object tree.
  pub pkgdir: PathBuf,
  /// Directory receiving linked binaries.
  pub bindir: PathBuf,
  /// Root of the dependency cache.
  pub cachedir: PathBuf,
  pub options: BuildOptions,
}

impl BuildContext {
  /// Context using the conventional layout under `project_root`.
  ///
  /// Objects go to `<root>/.kang/pkg`, binaries to `<root>/bin`, fetched
  /// dependencies to `<root>/.cache`.
  pub fn for_project(project_root: &Path, workdir: PathBuf, target: Platform, host: Platform) -> Self {
    Self {
      target,
      host,
      workdir,
      pkgdir: project_root.join(STATE_DIR_NAME).join("pkg"),
      bindir: project_root.join(BIN_DIR_NAME),
      cachedir: project_root.join(CACHE_DIR_NAME),
      options: BuildOptions::default(),
    }
  }

  pub fn with_options(mut self, options: BuildOptions) -> Self {
    self.options = options;
    self
  }

  /// Source file selection for the target platform and build tags.
  pub fn constraints(&self) -> Constraints {
    Constraints::new(self.target, self.options.tags.clone())
  }

  pub fn is_cross_compiling(&self) -> bool {
    self.target != self.host
  }

  /// Directory holding the objects for this target (and instrumentation mode).
  pub fn object_dir(&self) -> PathBuf {
    let mut name = self.target.dir_name();
    if self.options.race {
      name.push_str("_race");
    }
    self.pkgdir.join(name)
  }

  /// Path of the compiled archive for `import_path`.
  pub fn object_path(&self, import_path: &str) -> PathBuf {
    // Import paths may contain dots (`gopkg.in/yaml.v2`), so the extension is
    // appended rather than set.
    let mut path = self.object_dir();
    for element in import_path.split('/') {
      path.push(element);
    }
    let mut file = path.into_os_string();
    file.push(".");
    file.push(OBJECT_EXT);
    PathBuf::from(file)
  }

  /// Path of the linked binary for a main package.
  ///
  /// The name is the last import path element, suffixed with the target
  /// platform when cross compiling and with the build tags when set.
  pub fn binary_path(&self, package: &Package) -> PathBuf {
    let mut name = package.name().to_string();
    if self.is_cross_compiling() {
      name.push_str(&self.target.binary_suffix());
    }
    if !self.options.tags.is_empty() {
      name.push('-');
      name.push_str(&self.options.tags.join("-"));
    }
    name.push_str(self.target.os.exe_suffix());
    self.bindir.join(name)
  }
}
