//! Content-addressed dependency cache.
//!
//! Every pinned dependency lives in its own entry directory, addressed by the
//! SHA-256 of its prefix, pin kind and pin value and sharded over two levels:
//!
//! ```text
//! <project>/.cache/<hex(digest[0..1])>/<hex(digest[1..])>/<import path...>
//! ```
//!
//! An entry is complete once it carries the [`CACHE_COMPLETE_MARKER`]. Entries
//! are materialized into a staging directory beside their final location and
//! renamed into place, so a half-fetched tree is never mistaken for a complete
//! one. A complete entry is reused as is, within one run and across runs.

pub mod fetch;
pub mod lock;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PinSpec;
use crate::consts::{CACHE_COMPLETE_MARKER, CACHE_SHARD_BYTES};
use crate::util::hash::{ContentHash, sharded_hash};

use fetch::{FetchError, Fetcher};

/// Errors that can occur while materializing cache entries.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to create cache directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to fetch {spec}: {source}")]
  Fetch {
    spec: String,
    #[source]
    source: FetchError,
  },

  #[error("failed to publish cache entry {}: {source}", path.display())]
  Publish {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// The on-disk dependency cache of one project.
pub struct DependencyCache {
  root: PathBuf,
  fetcher: Box<dyn Fetcher>,
  /// Entries confirmed complete during this run.
  ready: HashSet<ContentHash>,
}

impl DependencyCache {
  pub fn new(root: impl Into<PathBuf>, fetcher: Box<dyn Fetcher>) -> Self {
    Self {
      root: root.into(),
      fetcher,
      ready: HashSet::new(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory of the entry for `spec`, whether or not it exists yet.
  pub fn entry_dir(&self, spec: &PinSpec) -> PathBuf {
    sharded_hash(spec.cache_key_material().as_bytes(), CACHE_SHARD_BYTES).dir_under(&self.root)
  }

  /// Whether the entry for `spec` has been fully materialized.
  pub fn is_complete(&self, spec: &PinSpec) -> bool {
    self.entry_dir(spec).join(CACHE_COMPLETE_MARKER).is_file()
  }

  /// Return the entry directory for `spec`, fetching it first if needed.
  ///
  /// The fetcher is invoked at most once per entry: never when a complete
  /// entry is already on disk, and never twice within one run.
  pub fn ensure(&mut self, spec: &PinSpec) -> Result<PathBuf, CacheError> {
    let key = sharded_hash(spec.cache_key_material().as_bytes(), CACHE_SHARD_BYTES);
    let entry = key.dir_under(&self.root);
    let key = key.full();

    if self.ready.contains(&key) {
      return Ok(entry);
    }

    if entry.join(CACHE_COMPLETE_MARKER).is_file() {
      debug!(spec = %spec, entry = %entry.display(), "cache hit");
      self.ready.insert(key);
      return Ok(entry);
    }

    self.materialize(spec, &entry)?;
    self.ready.insert(key);
    Ok(entry)
  }

  fn materialize(&self, spec: &PinSpec, entry: &Path) -> Result<(), CacheError> {
    let shard = entry.parent().unwrap_or(&self.root);
    fs::create_dir_all(shard).map_err(|source| CacheError::CreateDir {
      path: shard.to_path_buf(),
      source,
    })?;

    let staging = tempfile::Builder::new()
      .prefix(".fetch-")
      .tempdir_in(shard)
      .map_err(|source| CacheError::CreateDir {
        path: shard.to_path_buf(),
        source,
      })?;

    let dest = package_dir(staging.path(), &spec.prefix);
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    info!(spec = %spec, entry = %entry.display(), "materializing dependency");
    self.fetcher.fetch(spec, &dest).map_err(|source| CacheError::Fetch {
      spec: spec.to_string(),
      source,
    })?;

    let publish_err = |source| CacheError::Publish {
      path: entry.to_path_buf(),
      source,
    };

    fs::write(staging.path().join(CACHE_COMPLETE_MARKER), spec.to_string()).map_err(publish_err)?;

    // Leftovers of an interrupted run have no marker and are replaced.
    if entry.join(CACHE_COMPLETE_MARKER).is_file() {
      return Ok(());
    }
    if entry.exists() {
      fs::remove_dir_all(entry).map_err(publish_err)?;
    }

    // From here on the staged tree is either renamed away or removed by hand.
    let staged = staging.keep();
    let Err(err) = fs::rename(&staged, entry) else {
      return Ok(());
    };
    if let Err(cleanup) = fs::remove_dir_all(&staged) {
      warn!(path = %staged.display(), error = %cleanup, "failed to remove staging directory");
    }
    // Another process may have published the same entry first.
    if entry.join(CACHE_COMPLETE_MARKER).is_file() {
      debug!(entry = %entry.display(), "entry published concurrently");
      return Ok(());
    }
    Err(publish_err(err))
  }
}

/// Directory of `import_path` inside a cache entry (or any import-path rooted tree).
pub fn package_dir(entry: &Path, import_path: &str) -> PathBuf {
  let mut dir = entry.to_path_buf();
  for element in import_path.split('/') {
    dir.push(element);
  }
  dir
}
