mod build;
mod plan;

pub use build::cmd_build;
pub use plan::cmd_plan;

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use tempfile::TempDir;
use tracing::{debug, info};

use kang_lib::cache::lock::{CacheLock, CacheLockError, LockMode};
use kang_lib::config::{self, Config};
use kang_lib::context::{BuildContext, BuildOptions};
use kang_lib::platform::{Arch, Os, Platform};

use crate::output::OutputFormat;

/// Flags shared by `build` and `plan`.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
  /// Rebuild every package, even when up to date
  #[arg(long)]
  pub force: bool,

  /// Build with the race detector
  #[arg(long)]
  pub race: bool,

  /// Target operating system (default: host)
  #[arg(long)]
  pub os: Option<String>,

  /// Target architecture (default: host)
  #[arg(long)]
  pub arch: Option<String>,

  /// Build tags, comma separated
  #[arg(long, value_delimiter = ',')]
  pub tags: Vec<String>,

  /// Extra compiler flags, space separated
  #[arg(long, allow_hyphen_values = true)]
  pub gcflags: Option<String>,

  /// Extra linker flags, space separated
  #[arg(long, allow_hyphen_values = true)]
  pub ldflags: Option<String>,

  /// How long to wait for another kang process to release the cache (e.g. "30s")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub wait: Option<Duration>,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub output: OutputFormat,
}

impl TargetArgs {
  fn options(&self) -> BuildOptions {
    let split = |flags: &Option<String>| -> Vec<String> {
      flags
        .as_deref()
        .map(|f| f.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
    };
    BuildOptions {
      force: self.force,
      race: self.race,
      gcflags: split(&self.gcflags),
      ldflags: split(&self.ldflags),
      tags: self.tags.iter().filter(|t| !t.is_empty()).cloned().collect(),
    }
  }

  fn target(&self, host: Platform) -> Result<Platform> {
    let os = match &self.os {
      Some(os) => os.parse::<Os>()?,
      None => host.os,
    };
    let arch = match &self.arch {
      Some(arch) => arch.parse::<Arch>()?,
      None => host.arch,
    };
    Ok(Platform::new(os, arch))
  }
}

/// Everything a command needs to drive the pipeline.
pub(crate) struct Session {
  pub config: Config,
  pub ctx: BuildContext,
  /// Scratch directory for the toolchain, removed on drop.
  _workdir: TempDir,
}

/// Load the configuration and set up the build context.
pub(crate) fn prepare(file: Option<&Path>, args: &TargetArgs) -> Result<Session> {
  let path = match file {
    Some(path) => path.to_path_buf(),
    None => {
      let cwd = std::env::current_dir().context("Failed to determine current directory")?;
      config::find_config(&cwd)?
    }
  };
  let config = config::load(&path)?;
  info!(config = %config.path.display(), project = %config.project, "loaded configuration");

  let host = Platform::host()?;
  let target = args.target(host)?;
  let workdir = tempfile::Builder::new()
    .prefix("kang")
    .tempdir()
    .context("Failed to create work directory")?;

  let ctx =
    BuildContext::for_project(&config.root, workdir.path().to_path_buf(), target, host).with_options(args.options());
  debug!(target = %ctx.target, host = %ctx.host, pkgdir = %ctx.pkgdir.display(), "build context");

  Ok(Session {
    config,
    ctx,
    _workdir: workdir,
  })
}

/// Take the cache lock, retrying until `wait` elapses when another process holds it.
pub(crate) fn lock_cache(ctx: &BuildContext, mode: LockMode, command: &str, wait: Option<Duration>) -> Result<CacheLock> {
  let deadline = wait.map(|wait| Instant::now() + wait);
  loop {
    match CacheLock::acquire(&ctx.cachedir, mode, command) {
      Ok(lock) => return Ok(lock),
      Err(CacheLockError::Contention { .. } | CacheLockError::ContentionUnknown { .. })
        if deadline.is_some_and(|d| Instant::now() < d) =>
      {
        thread::sleep(Duration::from_millis(100));
      }
      Err(err) => return Err(err.into()),
    }
  }
}
