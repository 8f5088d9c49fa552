//! Implementation of the `kang plan` command.
//!
//! Runs the pipeline up to scheduling and prints the actions a build would
//! take, with the reason each stale package needs rebuilding. The toolchain
//! is never invoked; pinned dependencies are still fetched into the cache.

use std::path::Path;

use anyhow::Result;

use kang_lib::cache::fetch::GitFetcher;
use kang_lib::cache::lock::LockMode;
use kang_lib::consts::APP_NAME;
use kang_lib::pipeline::{self, Mode};
use kang_lib::schedule::ActionKind;
use kang_lib::toolchain::GoToolchain;

use super::{TargetArgs, lock_cache, prepare};
use crate::output::{print_action, print_info, print_json, print_stat};

pub fn cmd_plan(file: Option<&Path>, args: &TargetArgs) -> Result<()> {
  let session = prepare(file, args)?;
  let _lock = lock_cache(&session.ctx, LockMode::Shared, &format!("{APP_NAME} plan"), args.wait)?;

  let toolchain = GoToolchain::new(session.ctx.clone());
  let outcome = pipeline::build(
    &session.config,
    &session.ctx,
    &toolchain,
    Box::new(GitFetcher::default()),
    Mode::Plan,
  )?;

  if args.output.is_json() {
    return print_json(&outcome);
  }

  print_info(&format!(
    "plan for {} ({})",
    session.config.project, session.ctx.target
  ));

  let mut to_build = 0;
  for entry in &outcome.plan {
    let (stale, note) = match entry.action {
      ActionKind::Compile { link } => {
        to_build += 1;
        let reason = entry.stale.as_ref().map(|r| r.to_string()).unwrap_or_default();
        let note = if link { format!("compile and link, {reason}") } else { format!("compile, {reason}") };
        (true, note)
      }
      ActionKind::UpToDate => (false, "up to date".to_string()),
      ActionKind::Group => continue,
    };
    print_action(stale, &entry.import_path, &note);
  }

  print_stat("packages", &outcome.packages.to_string());
  print_stat("external", &outcome.external.to_string());
  print_stat("to build", &to_build.to_string());

  Ok(())
}
