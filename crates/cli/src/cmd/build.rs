//! Implementation of the `kang build` command.
//!
//! Resolves the project's packages, compiles every stale one in dependency
//! order and links the main packages into the binary directory.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use kang_lib::cache::fetch::GitFetcher;
use kang_lib::cache::lock::LockMode;
use kang_lib::consts::APP_NAME;
use kang_lib::pipeline::{self, Mode};
use kang_lib::toolchain::GoToolchain;

use super::{TargetArgs, lock_cache, prepare};
use crate::output::{format_duration, print_info, print_json, print_stat, print_success, symbols};

pub fn cmd_build(file: Option<&Path>, args: &TargetArgs) -> Result<()> {
  let session = prepare(file, args)?;
  let _lock = lock_cache(&session.ctx, LockMode::Exclusive, &format!("{APP_NAME} build"), args.wait)?;

  let started = Instant::now();
  let toolchain = GoToolchain::new(session.ctx.clone());
  let outcome = pipeline::build(
    &session.config,
    &session.ctx,
    &toolchain,
    Box::new(GitFetcher::default()),
    Mode::Build,
  )?;
  let elapsed = started.elapsed();

  if args.output.is_json() {
    return print_json(&outcome);
  }

  let summary = outcome.summary.unwrap_or_default();
  for import_path in &summary.compiled {
    print_success(&format!("compiled {import_path}"));
  }
  for import_path in &summary.linked {
    print_success(&format!("linked {import_path}"));
  }

  if summary.compiled.is_empty() {
    print_info("everything up to date");
  }
  print_stat("packages", &outcome.packages.to_string());
  print_stat("compiled", &summary.compiled.len().to_string());
  print_stat(
    "up to date",
    &outcome.packages.saturating_sub(summary.compiled.len()).to_string(),
  );
  print_stat(
    "binaries",
    &format!("{} {} {}", summary.linked.len(), symbols::ARROW, session.ctx.bindir.display()),
  );
  print_stat("time", &format_duration(elapsed));

  Ok(())
}
