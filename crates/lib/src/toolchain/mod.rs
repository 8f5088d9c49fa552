//! Compiler and linker invocation.
//!
//! The scheduler only sees the [`Toolchain`] trait. [`GoToolchain`] drives
//! `go tool compile` and `go tool link`, publishing every artifact through
//! [`atomic::publish`] so a failed step never replaces a good artifact.

pub mod atomic;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

use crate::context::BuildContext;
use crate::package::Package;

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("failed to run {tool}: {source}")]
  Spawn {
    tool: String,
    #[source]
    source: io::Error,
  },

  #[error("{}: {stderr}", exit_status(*code))]
  Failed {
    code: Option<i32>,
    /// First line of the tool's error output, noting how many lines follow.
    stderr: String,
  },

  #[error("failed to publish {}: {source}", path.display())]
  Publish {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Produces objects and binaries for packages.
pub trait Toolchain {
  /// Compile `package` into its object, whose dependencies are already built.
  fn compile(&self, package: &Package) -> Result<(), ToolchainError>;

  /// Link the main package `package` into its binary.
  fn link(&self, package: &Package) -> Result<(), ToolchainError>;
}

/// The `go` command's compiler and linker.
#[derive(Debug, Clone)]
pub struct GoToolchain {
  go: PathBuf,
  ctx: BuildContext,
}

impl GoToolchain {
  pub fn new(ctx: BuildContext) -> Self {
    Self::with_go(PathBuf::from("go"), ctx)
  }

  pub fn with_go(go: impl Into<PathBuf>, ctx: BuildContext) -> Self {
    Self { go: go.into(), ctx }
  }

  fn command(&self, tool: &str) -> Command {
    let mut command = Command::new(&self.go);
    command
      .arg("tool")
      .arg(tool)
      .env("GOOS", self.ctx.target.os.as_str())
      .env("GOARCH", self.ctx.target.arch.as_str());
    command
  }

  fn run(&self, mut command: Command, package: &Package) -> Result<(), ToolchainError> {
    debug!(command = ?command, "running toolchain");
    let output = command.output().map_err(|source| ToolchainError::Spawn {
      tool: self.go.display().to_string(),
      source,
    })?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      info!(
        import_path = %package.import_path,
        status = %output.status,
        "toolchain output:\n{}",
        stderr.trim_end()
      );
      return Err(ToolchainError::Failed {
        code: output.status.code(),
        stderr: first_line(&stderr),
      });
    }
    Ok(())
  }

  fn compile_args(&self, package: &Package, out: &Path) -> Vec<OsString> {
    let options = &self.ctx.options;
    let mut args: Vec<OsString> = vec![
      "-o".into(),
      out.into(),
      "-p".into(),
      package.import_path.as_str().into(),
      "-pack".into(),
      "-trimpath".into(),
      self.ctx.workdir.as_os_str().into(),
      "-I".into(),
      self.ctx.object_dir().into(),
    ];
    if options.race {
      args.push("-race".into());
    }
    args.extend(options.gcflags.iter().map(OsString::from));
    args.extend(package.source_paths().map(OsString::from));
    args
  }

  fn link_args(&self, package: &Package, out: &Path) -> Vec<OsString> {
    let options = &self.ctx.options;
    let mut args: Vec<OsString> = vec![
      "-o".into(),
      out.into(),
      "-L".into(),
      self.ctx.object_dir().into(),
    ];
    if options.race {
      args.push("-race".into());
    }
    args.extend(options.ldflags.iter().map(OsString::from));
    args.push(self.ctx.object_path(&package.import_path).into());
    args
  }
}

impl Toolchain for GoToolchain {
  fn compile(&self, package: &Package) -> Result<(), ToolchainError> {
    let object = self.ctx.object_path(&package.import_path);
    info!(import_path = %package.import_path, object = %object.display(), "compile");

    atomic::publish(&object, |tmp| {
      let mut command = self.command("compile");
      command.args(self.compile_args(package, tmp)).current_dir(&package.dir);
      self.run(command, package)
    })
  }

  fn link(&self, package: &Package) -> Result<(), ToolchainError> {
    let binary = self.ctx.binary_path(package);
    info!(import_path = %package.import_path, binary = %binary.display(), "link");

    atomic::publish(&binary, |tmp| {
      let mut command = self.command("link");
      command.args(self.link_args(package, tmp));
      self.run(command, package)
    })
  }
}

fn exit_status(code: Option<i32>) -> String {
  match code {
    Some(code) => format!("exit status {code}"),
    None => "terminated by signal".to_string(),
  }
}

/// The first non-blank line of `output`, with a count of the remaining ones.
fn first_line(output: &str) -> String {
  let mut lines = output.lines().map(str::trim_end).filter(|line| !line.trim().is_empty());
  let Some(first) = lines.next() else {
    return "no error output".to_string();
  };
  match lines.count() {
    0 => first.trim().to_string(),
    1 => format!("{} (1 more line)", first.trim()),
    more => format!("{} ({more} more lines)", first.trim()),
  }
}
