//! Shared fixtures for pipeline tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use kang_lib::cache::fetch::{FetchError, Fetcher};
use kang_lib::config::{self, Config, PinSpec};
use kang_lib::context::{BuildContext, BuildOptions};
use kang_lib::package::Package;
use kang_lib::pipeline::{self, BuildError, BuildOutcome, Mode};
use kang_lib::platform::{Arch, Os, Platform};
use kang_lib::toolchain::{Toolchain, ToolchainError};

/// Artifacts written by the fake toolchain are stamped this far in the future,
/// one second apart, so their ordering never depends on filesystem granularity.
const ARTIFACT_EPOCH: Duration = Duration::from_secs(3600);

pub fn linux() -> Platform {
  Platform::new(Os::Linux, Arch::Amd64)
}

/// A project directory on disk plus the context used to build it.
pub struct Project {
  pub temp: TempDir,
  pub config: Config,
  pub ctx: BuildContext,
}

impl Project {
  /// Create a project from a kangfile body and `(path, content)` source files.
  pub fn new(kangfile: &str, files: &[(&str, &str)]) -> Self {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".kangfile");
    fs::write(&path, kangfile).unwrap();
    for (file, content) in files {
      write_file(&temp.path().join(file), content);
    }

    let config = config::load(&path).unwrap();
    let ctx = BuildContext::for_project(&config.root, temp.path().join(".work"), linux(), linux());
    Self { temp, config, ctx }
  }

  pub fn with_options(mut self, options: BuildOptions) -> Self {
    self.ctx = self.ctx.with_options(options);
    self
  }

  pub fn root(&self) -> &Path {
    &self.config.root
  }

  pub fn object(&self, import_path: &str) -> PathBuf {
    self.ctx.object_path(import_path)
  }

  pub fn build(&self, toolchain: &FakeToolchain, fetcher: &FakeFetcher) -> Result<BuildOutcome, BuildError> {
    pipeline::build(&self.config, &self.ctx, toolchain, Box::new(fetcher.clone()), Mode::Build)
  }

  pub fn plan(&self, toolchain: &FakeToolchain, fetcher: &FakeFetcher) -> Result<BuildOutcome, BuildError> {
    pipeline::build(&self.config, &self.ctx, toolchain, Box::new(fetcher.clone()), Mode::Plan)
  }
}

pub fn write_file(path: &Path, content: &str) {
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, content).unwrap();
}

/// Set the modification time of `path` relative to now.
pub fn set_mtime(path: &Path, offset: Duration) {
  let file = fs::File::options().write(true).open(path).unwrap();
  file.set_modified(SystemTime::now() + offset).unwrap();
}

/// Records toolchain calls and writes placeholder artifacts.
///
/// Every artifact gets a strictly later mtime than the previous one.
pub struct FakeToolchain {
  ctx: BuildContext,
  clock: Cell<u64>,
  base: SystemTime,
  pub calls: RefCell<Vec<String>>,
  /// Import paths whose compile fails.
  pub broken: Vec<String>,
}

impl FakeToolchain {
  pub fn new(ctx: &BuildContext) -> Self {
    Self::with_epoch(ctx, ARTIFACT_EPOCH)
  }

  /// Stamp artifacts starting `epoch` from now.
  pub fn with_epoch(ctx: &BuildContext, epoch: Duration) -> Self {
    Self {
      ctx: ctx.clone(),
      clock: Cell::new(0),
      base: SystemTime::now() + epoch,
      calls: RefCell::new(Vec::new()),
      broken: Vec::new(),
    }
  }

  pub fn failing(ctx: &BuildContext, import_path: &str) -> Self {
    Self {
      broken: vec![import_path.to_string()],
      ..Self::new(ctx)
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.borrow().clone()
  }

  pub fn reset(&self) {
    self.calls.borrow_mut().clear();
  }

  fn stamp(&self, path: &Path) {
    let tick = self.clock.get() + 1;
    self.clock.set(tick);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = fs::File::create(path).unwrap();
    file.set_modified(self.base + Duration::from_secs(tick)).unwrap();
  }
}

impl Toolchain for FakeToolchain {
  fn compile(&self, package: &Package) -> Result<(), ToolchainError> {
    self.calls.borrow_mut().push(format!("compile {}", package.import_path));
    if self.broken.contains(&package.import_path) {
      return Err(ToolchainError::Failed {
        code: Some(2),
        stderr: "syntax error".to_string(),
      });
    }
    self.stamp(&self.ctx.object_path(&package.import_path));
    Ok(())
  }

  fn link(&self, package: &Package) -> Result<(), ToolchainError> {
    self.calls.borrow_mut().push(format!("link {}", package.import_path));
    self.stamp(&self.ctx.binary_path(package));
    Ok(())
  }
}

/// Serves canned source trees keyed by rule prefix and counts fetches.
#[derive(Clone, Default)]
pub struct FakeFetcher {
  /// prefix -> (relative file path, content)
  trees: Rc<HashMap<String, Vec<(String, String)>>>,
  pub fetched: Rc<RefCell<Vec<String>>>,
}

impl FakeFetcher {
  pub fn new(trees: &[(&str, &[(&str, &str)])]) -> Self {
    let trees = trees
      .iter()
      .map(|(prefix, files)| {
        let files = files.iter().map(|(f, c)| (f.to_string(), c.to_string())).collect();
        (prefix.to_string(), files)
      })
      .collect();
    Self {
      trees: Rc::new(trees),
      fetched: Rc::new(RefCell::new(Vec::new())),
    }
  }

  pub fn fetched(&self) -> Vec<String> {
    self.fetched.borrow().clone()
  }
}

impl Fetcher for FakeFetcher {
  fn fetch(&self, spec: &PinSpec, dest: &Path) -> Result<(), FetchError> {
    self.fetched.borrow_mut().push(spec.to_string());
    fs::create_dir_all(dest).unwrap();
    for (file, content) in self.trees.get(&spec.prefix).into_iter().flatten() {
      write_file(&dest.join(file), content);
    }
    Ok(())
  }
}

/// `app` imports `b` and `c`, which both import `d`.
pub fn diamond() -> Project {
  Project::new(
    r#"project = "example.com/app""#,
    &[
      (
        "main.go",
        "package main\n\nimport (\n\t\"fmt\"\n\n\t\"example.com/app/b\"\n\t\"example.com/app/c\"\n)\n\nfunc main() { fmt.Println(b.B, c.C) }\n",
      ),
      ("b/b.go", "package b\n\nimport \"example.com/app/d\"\n\nvar B = d.D\n"),
      ("c/c.go", "package c\n\nimport \"example.com/app/d\"\n\nvar C = d.D\n"),
      ("d/d.go", "package d\n\nconst D = 1\n"),
    ],
  )
}
