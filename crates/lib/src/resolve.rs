//! Resolving imports that are not part of the project.
//!
//! The resolver maps an import path to the first pin rule whose prefix
//! matches, makes sure the rule's cache entry is materialized and loads the
//! package from it. [`Resolver::resolve_closure`] repeats this for every
//! import of every newly found package until nothing new turns up.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, DependencyCache, package_dir};
use crate::config::PinSpec;
use crate::constraint::Constraints;
use crate::loader::{self, LoadError};
use crate::package::RawPackage;
use crate::stdlib;

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("cannot resolve import {import_path}: no dependency rule matches (imported by {importer})")]
  Unresolved { import_path: String, importer: String },

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("failed to load {import_path} from {}: {source}", dir.display())]
  Load {
    import_path: String,
    dir: PathBuf,
    #[source]
    source: LoadError,
  },
}

/// Ordered pin rules backed by a dependency cache.
pub struct Resolver {
  rules: Vec<PinSpec>,
  cache: DependencyCache,
  constraints: Constraints,
}

impl Resolver {
  pub fn new(rules: Vec<PinSpec>, cache: DependencyCache, constraints: Constraints) -> Self {
    Self {
      rules,
      cache,
      constraints,
    }
  }

  pub fn cache(&self) -> &DependencyCache {
    &self.cache
  }

  /// The rule for `import_path`: the first registered one whose prefix matches.
  pub fn rule_for(&self, import_path: &str) -> Option<&PinSpec> {
    self.rules.iter().find(|rule| rule.matches(import_path))
  }

  /// Load the external package `import_path`.
  pub fn resolve(&mut self, import_path: &str) -> Result<RawPackage, ResolveError> {
    self.resolve_for(import_path, "command line")
  }

  fn resolve_for(&mut self, import_path: &str, importer: &str) -> Result<RawPackage, ResolveError> {
    let Some(rule) = self.rules.iter().find(|rule| rule.matches(import_path)) else {
      return Err(ResolveError::Unresolved {
        import_path: import_path.to_string(),
        importer: importer.to_string(),
      });
    };
    debug!(import_path, rule = %rule, "matched dependency rule");

    let entry = self.cache.ensure(rule)?;
    let dir = package_dir(&entry, import_path);
    let raw = loader::load_dir(&dir, &self.constraints).map_err(|source| ResolveError::Load {
      import_path: import_path.to_string(),
      dir: dir.clone(),
      source,
    })?;

    Ok(raw.with_import_path(import_path))
  }

  /// Resolve every external package reachable from `local`.
  ///
  /// Imports that are local, standard or already resolved are skipped. The
  /// result lists packages in the order they were first reached.
  pub fn resolve_closure(&mut self, local: &[RawPackage]) -> Result<Vec<RawPackage>, ResolveError> {
    let mut known: HashSet<String> = local.iter().map(|pkg| pkg.import_path.clone()).collect();
    let mut queue: VecDeque<(String, String)> = VecDeque::new();
    let mut resolved = Vec::new();

    for pkg in local {
      enqueue(pkg, &mut known, &mut queue);
    }

    while let Some((import_path, importer)) = queue.pop_front() {
      let raw = self.resolve_for(&import_path, &importer)?;
      enqueue(&raw, &mut known, &mut queue);
      resolved.push(raw);
    }

    if !resolved.is_empty() {
      info!(count = resolved.len(), "resolved external packages");
    }
    Ok(resolved)
  }
}

/// Queue the imports of `pkg` that are neither elided nor already known.
fn enqueue(pkg: &RawPackage, known: &mut HashSet<String>, queue: &mut VecDeque<(String, String)>) {
  for import in &pkg.imports {
    if stdlib::is_elided(import) || !known.insert(import.clone()) {
      continue;
    }
    queue.push_back((import.clone(), pkg.import_path.clone()));
  }
}
