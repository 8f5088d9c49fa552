//! Incremental rebuild behavior of `pipeline::build`.

use std::fs;
use std::time::Duration;

use kang_lib::context::BuildOptions;
use kang_lib::platform::{Arch, Os, Platform};
use kang_lib::schedule::ActionKind;
use kang_lib::stale::StaleReason;

use super::common::{FakeFetcher, FakeToolchain, Project, diamond, set_mtime};

mod first_build {
  use super::*;

  #[test]
  fn compiles_dependencies_before_dependents() {
    let project = diamond();
    let toolchain = FakeToolchain::new(&project.ctx);

    let outcome = project.build(&toolchain, &FakeFetcher::default()).unwrap();

    assert_eq!(
      toolchain.calls(),
      vec![
        "compile example.com/app/d",
        "compile example.com/app/b",
        "compile example.com/app/c",
        "compile example.com/app",
        "link example.com/app",
      ]
    );
    assert_eq!(outcome.roots, vec!["example.com/app"]);
    assert_eq!(outcome.packages, 4);
    assert_eq!(outcome.external, 0);

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.compiled.len(), 4);
    assert_eq!(summary.linked, vec!["example.com/app"]);
  }

  #[test]
  fn shared_dependency_is_compiled_once() {
    let project = diamond();
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &FakeFetcher::default()).unwrap();

    let d_compiles = toolchain
      .calls()
      .iter()
      .filter(|call| *call == "compile example.com/app/d")
      .count();
    assert_eq!(d_compiles, 1);
  }

  #[test]
  fn writes_objects_and_binary() {
    let project = diamond();
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &FakeFetcher::default()).unwrap();

    for import_path in ["example.com/app", "example.com/app/b", "example.com/app/c", "example.com/app/d"] {
      assert!(project.object(import_path).is_file(), "{import_path} has no object");
    }
    assert!(project.root().join("bin").join("app").is_file());
  }
}

mod rebuild {
  use super::*;

  #[test]
  fn second_build_runs_nothing() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &fetcher).unwrap();
    toolchain.reset();

    let outcome = project.build(&toolchain, &fetcher).unwrap();
    assert!(toolchain.calls().is_empty());

    let summary = outcome.summary.unwrap();
    assert!(summary.compiled.is_empty());
    assert!(summary.linked.is_empty());
    assert_eq!(summary.up_to_date.len(), 4);
  }

  #[test]
  fn missing_object_rebuilds_it_and_its_dependents() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &fetcher).unwrap();
    fs::remove_file(project.object("example.com/app/d")).unwrap();
    toolchain.reset();

    project.build(&toolchain, &fetcher).unwrap();
    assert_eq!(
      toolchain.calls(),
      vec![
        "compile example.com/app/d",
        "compile example.com/app/b",
        "compile example.com/app/c",
        "compile example.com/app",
        "link example.com/app",
      ]
    );
  }

  #[test]
  fn modified_source_rebuilds_only_its_path_to_the_root() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let first = FakeToolchain::new(&project.ctx);
    project.build(&first, &fetcher).unwrap();

    // Newer than every object the first build wrote.
    set_mtime(&project.root().join("c").join("c.go"), Duration::from_secs(90 * 60));

    let second = FakeToolchain::with_epoch(&project.ctx, Duration::from_secs(2 * 3600));
    let plan = project.plan(&second, &fetcher).unwrap();
    let stale: Vec<_> = plan
      .plan
      .iter()
      .filter(|entry| entry.stale.is_some())
      .map(|entry| (entry.import_path.as_str(), entry.stale.clone().unwrap()))
      .collect();
    assert_eq!(
      stale,
      vec![
        ("example.com/app/c", StaleReason::SourceNewer("c.go".to_string())),
        (
          "example.com/app",
          StaleReason::Dependency("example.com/app/c".to_string())
        ),
      ]
    );

    project.build(&second, &fetcher).unwrap();
    assert_eq!(
      second.calls(),
      vec!["compile example.com/app/c", "compile example.com/app", "link example.com/app"]
    );

    second.reset();
    project.build(&second, &fetcher).unwrap();
    assert!(second.calls().is_empty());
  }

  #[test]
  fn missing_binary_relinks_without_recompiling_dependencies() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &fetcher).unwrap();
    fs::remove_file(project.root().join("bin").join("app")).unwrap();
    toolchain.reset();

    project.build(&toolchain, &fetcher).unwrap();
    assert_eq!(toolchain.calls(), vec!["compile example.com/app", "link example.com/app"]);
  }

  #[test]
  fn force_rebuilds_everything() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let toolchain = FakeToolchain::new(&project.ctx);
    project.build(&toolchain, &fetcher).unwrap();

    let project = project.with_options(BuildOptions {
      force: true,
      ..Default::default()
    });
    let toolchain = FakeToolchain::with_epoch(&project.ctx, Duration::from_secs(2 * 3600));
    let outcome = project.build(&toolchain, &fetcher).unwrap();

    assert_eq!(outcome.summary.unwrap().compiled.len(), 4);
    assert_eq!(
      outcome.plan.iter().find(|entry| entry.import_path == "example.com/app/d").unwrap().stale,
      Some(StaleReason::Forced)
    );
  }
}

mod plan_mode {
  use super::*;

  #[test]
  fn lists_actions_without_running_them() {
    let project = diamond();
    let toolchain = FakeToolchain::new(&project.ctx);

    let outcome = project.plan(&toolchain, &FakeFetcher::default()).unwrap();

    assert!(toolchain.calls().is_empty());
    assert!(outcome.summary.is_none());
    assert!(!project.object("example.com/app/d").exists());

    let actions: Vec<_> = outcome
      .plan
      .iter()
      .map(|entry| (entry.import_path.as_str(), entry.action))
      .collect();
    assert_eq!(
      actions,
      vec![
        ("example.com/app/d", ActionKind::Compile { link: false }),
        ("example.com/app/b", ActionKind::Compile { link: false }),
        ("example.com/app/c", ActionKind::Compile { link: false }),
        ("example.com/app", ActionKind::Compile { link: true }),
      ]
    );
  }

  #[test]
  fn fresh_packages_are_planned_up_to_date() {
    let project = diamond();
    let fetcher = FakeFetcher::default();
    let toolchain = FakeToolchain::new(&project.ctx);
    project.build(&toolchain, &fetcher).unwrap();

    let outcome = project.plan(&toolchain, &fetcher).unwrap();
    let app = outcome
      .plan
      .iter()
      .find(|entry| entry.import_path == "example.com/app")
      .unwrap();
    assert_eq!(app.action, ActionKind::UpToDate);
    assert_eq!(app.stale, None);
    // A fresh root does not pull its dependencies into the plan.
    assert_eq!(outcome.plan.len(), 1);
  }
}

mod cross_build {
  use super::*;

  /// A main package with per-OS files; the linux one imports an unpinned package.
  fn per_os_project() -> Project {
    Project::new(
      r#"project = "example.com/app""#,
      &[
        ("main.go", "package main\n\nfunc main() { poll() }\n"),
        (
          "poll_linux.go",
          "package main\n\nimport \"golang.org/x/sys/unix\"\n\nfunc poll() { unix.Poll() }\n",
        ),
        (
          "poll_windows.go",
          "package main\n\nimport \"example.com/app/iocp\"\n\nfunc poll() { iocp.Wait() }\n",
        ),
        (
          "trace.go",
          "//go:build tracing\n\npackage main\n\nimport \"example.com/app/trace\"\n",
        ),
        ("iocp/iocp.go", "package iocp\n\nfunc Wait() {}\n"),
        ("trace/trace.go", "package trace\n"),
      ],
    )
  }

  #[test]
  fn target_selects_its_own_files() {
    let mut project = per_os_project();
    project.ctx.target = Platform::new(Os::Windows, Arch::Amd64);
    let toolchain = FakeToolchain::new(&project.ctx);

    let outcome = project.build(&toolchain, &FakeFetcher::default()).unwrap();

    assert_eq!(
      toolchain.calls(),
      vec!["compile example.com/app/iocp", "compile example.com/app", "link example.com/app"]
    );
    assert_eq!(outcome.packages, 2);
    assert!(project.root().join("bin").join("app-windows-amd64.exe").is_file());
  }

  #[test]
  fn files_of_other_targets_are_never_resolved() {
    let project = per_os_project();
    let toolchain = FakeToolchain::new(&project.ctx);

    // The linux file imports a package no dependency rule covers.
    let err = project.build(&toolchain, &FakeFetcher::default()).unwrap_err();
    assert!(err.to_string().contains("golang.org/x/sys/unix"));
    assert!(toolchain.calls().is_empty());
  }

  #[test]
  fn tags_enable_constrained_files() {
    let mut project = per_os_project().with_options(BuildOptions {
      tags: vec!["tracing".to_string()],
      ..Default::default()
    });
    project.ctx.target = Platform::new(Os::Windows, Arch::Amd64);
    let toolchain = FakeToolchain::new(&project.ctx);

    project.build(&toolchain, &FakeFetcher::default()).unwrap();

    assert_eq!(
      toolchain.calls(),
      vec![
        "compile example.com/app/iocp",
        "compile example.com/app/trace",
        "compile example.com/app",
        "link example.com/app",
      ]
    );
    assert!(project.root().join("bin").join("app-windows-amd64-tracing.exe").is_file());
  }
}
