//! Fatal pipeline errors.

use kang_lib::graph::GraphError;
use kang_lib::pipeline::BuildError;
use kang_lib::resolve::ResolveError;
use kang_lib::schedule::ExecuteError;

use super::common::{FakeFetcher, FakeToolchain, Project, diamond};

#[test]
fn import_cycle_is_reported_with_its_chain() {
  let project = Project::new(
    r#"project = "example.com/app""#,
    &[
      ("main.go", "package main\n\nimport \"example.com/app/b\"\n\nfunc main() { b.B() }\n"),
      ("b/b.go", "package b\n\nimport \"example.com/app\"\n\nfunc B() {}\n"),
    ],
  );
  let toolchain = FakeToolchain::new(&project.ctx);

  let err = project.build(&toolchain, &FakeFetcher::default()).unwrap_err();

  let BuildError::Graph(GraphError::Cycle { chain }) = &err else {
    panic!("expected a cycle, got {err:?}");
  };
  assert_eq!(chain, &["example.com/app", "example.com/app/b", "example.com/app"]);
  assert_eq!(
    err.to_string(),
    "import cycle: example.com/app -> example.com/app/b -> example.com/app"
  );
  assert!(toolchain.calls().is_empty());
}

#[test]
fn unpinned_import_is_unresolved() {
  let project = Project::new(
    r#"project = "example.com/app""#,
    &[("main.go", "package main\n\nimport \"example.org/missing\"\n\nfunc main() {}\n")],
  );

  let err = project
    .plan(&FakeToolchain::new(&project.ctx), &FakeFetcher::default())
    .unwrap_err();

  match err {
    BuildError::Resolve(ResolveError::Unresolved { import_path, importer }) => {
      assert_eq!(import_path, "example.org/missing");
      assert_eq!(importer, "example.com/app");
    }
    other => panic!("expected an unresolved import, got {other:?}"),
  }
}

#[test]
fn failed_compile_stops_before_dependents() {
  let project = diamond();
  let toolchain = FakeToolchain::failing(&project.ctx, "example.com/app/d");

  let err = project.build(&toolchain, &FakeFetcher::default()).unwrap_err();

  assert!(matches!(
    &err,
    BuildError::Execute(ExecuteError::Toolchain { step: "compile", import_path, .. })
      if import_path == "example.com/app/d"
  ));
  assert_eq!(err.to_string(), "compile example.com/app/d: exit status 2: syntax error");
  assert_eq!(toolchain.calls(), vec!["compile example.com/app/d"]);
  assert!(!project.root().join("bin").join("app").exists());
}

#[test]
fn failed_build_leaves_earlier_objects_fresh() {
  let project = diamond();
  let fetcher = FakeFetcher::default();
  let broken = FakeToolchain::failing(&project.ctx, "example.com/app/c");

  project.build(&broken, &fetcher).unwrap_err();
  assert_eq!(
    broken.calls(),
    vec!["compile example.com/app/d", "compile example.com/app/b", "compile example.com/app/c"]
  );

  let fixed = FakeToolchain::with_epoch(&project.ctx, std::time::Duration::from_secs(2 * 3600));
  project.build(&fixed, &fetcher).unwrap();
  assert_eq!(
    fixed.calls(),
    vec!["compile example.com/app/c", "compile example.com/app", "link example.com/app"]
  );
}
