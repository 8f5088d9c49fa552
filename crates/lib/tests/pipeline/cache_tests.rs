//! Pinned dependencies flowing through the dependency cache.

use sha2::{Digest, Sha256};

use kang_lib::consts::CACHE_COMPLETE_MARKER;

use super::common::{FakeFetcher, FakeToolchain, Project};

const LIB_KANGFILE: &str = r#"
project = "example.com/app"

[[dependency]]
prefix = "example.org/lib"
tag = "v1.2.0"
"#;

const MAIN_GO: &str = "package main\n\nimport (\n\t\"example.org/lib/other\"\n\t\"example.org/lib/sub\"\n)\n\nfunc main() { sub.Run(); other.Run() }\n";

fn lib_fetcher() -> FakeFetcher {
  FakeFetcher::new(&[(
    "example.org/lib",
    &[
      ("sub/sub.go", "package sub\n\nimport \"strings\"\n\nfunc Run() { _ = strings.ToUpper(\"x\") }\n"),
      ("other/other.go", "package other\n\nfunc Run() {}\n"),
    ],
  )])
}

fn lib_project() -> Project {
  Project::new(LIB_KANGFILE, &[("main.go", MAIN_GO)])
}

/// Where the entry for `example.org/lib` pinned at `tag=v1.2.0` must live.
fn expected_entry(project: &Project) -> std::path::PathBuf {
  let digest = hex::encode(Sha256::digest(b"example.org/libtag=v1.2.0"));
  project.ctx.cachedir.join(&digest[..2]).join(&digest[2..])
}

#[test]
fn packages_under_one_rule_share_one_fetch() {
  let project = lib_project();
  let fetcher = lib_fetcher();
  let toolchain = FakeToolchain::new(&project.ctx);

  let outcome = project.build(&toolchain, &fetcher).unwrap();

  assert_eq!(fetcher.fetched(), vec!["example.org/lib@tag=v1.2.0"]);
  assert_eq!(outcome.external, 2);
  assert_eq!(outcome.packages, 3);
  assert_eq!(
    toolchain.calls(),
    vec![
      "compile example.org/lib/other",
      "compile example.org/lib/sub",
      "compile example.com/app",
      "link example.com/app",
    ]
  );
}

#[test]
fn entry_is_addressed_by_rule_hash() {
  let project = lib_project();
  let fetcher = lib_fetcher();
  project.plan(&FakeToolchain::new(&project.ctx), &fetcher).unwrap();

  let entry = expected_entry(&project);
  assert!(entry.join(CACHE_COMPLETE_MARKER).is_file());
  assert!(entry.join("example.org").join("lib").join("sub").join("sub.go").is_file());
  assert!(entry.join("example.org").join("lib").join("other").join("other.go").is_file());
}

#[test]
fn complete_entry_is_reused_by_later_builds() {
  let project = lib_project();
  let fetcher = lib_fetcher();
  let toolchain = FakeToolchain::new(&project.ctx);

  project.build(&toolchain, &fetcher).unwrap();
  toolchain.reset();
  project.build(&toolchain, &fetcher).unwrap();

  assert_eq!(fetcher.fetched().len(), 1);
  assert!(toolchain.calls().is_empty());
}

#[test]
fn entry_without_marker_is_fetched_again() {
  let project = lib_project();
  let fetcher = lib_fetcher();
  project.plan(&FakeToolchain::new(&project.ctx), &fetcher).unwrap();

  std::fs::remove_file(expected_entry(&project).join(CACHE_COMPLETE_MARKER)).unwrap();
  project.plan(&FakeToolchain::new(&project.ctx), &fetcher).unwrap();

  assert_eq!(fetcher.fetched().len(), 2);
  assert!(expected_entry(&project).join(CACHE_COMPLETE_MARKER).is_file());
}

#[test]
fn changing_the_pin_uses_a_new_entry() {
  let project = lib_project();
  let fetcher = lib_fetcher();
  project.plan(&FakeToolchain::new(&project.ctx), &fetcher).unwrap();

  std::fs::write(&project.config.path, LIB_KANGFILE.replace("v1.2.0", "v1.3.0")).unwrap();
  let bumped = Project {
    config: kang_lib::config::load(&project.config.path).unwrap(),
    ..project
  };
  bumped.plan(&FakeToolchain::new(&bumped.ctx), &fetcher).unwrap();

  assert_eq!(
    fetcher.fetched(),
    vec!["example.org/lib@tag=v1.2.0", "example.org/lib@tag=v1.3.0"]
  );
}
