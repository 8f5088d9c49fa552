//! Materializing pinned dependency sources.
//!
//! The cache decides *whether* a tree needs fetching; a [`Fetcher`] only knows
//! *how* to put the pinned sources for a [`PinSpec`] into a directory.
//! [`GitFetcher`] clones the dependency's repository and exports the tree of
//! the pinned revision, without any `.git` metadata.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gix::remote::fetch::Tags;
use gix::traverse::tree::Recorder;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::config::{Pin, PinSpec};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while fetching a dependency.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to create the scratch clone directory.
  #[error("failed to create scratch directory: {0}")]
  Scratch(#[source] io::Error),

  /// Failed to clone the repository.
  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: BoxError,
  },

  /// The pinned revision does not exist in the repository.
  #[error("revision '{rev}' not found in repository")]
  RevisionNotFound { rev: String },

  /// Failed to read the tree of the pinned revision.
  #[error("failed to check out revision '{rev}': {source}")]
  Checkout {
    rev: String,
    #[source]
    source: BoxError,
  },

  /// Failed to write an exported file.
  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Places the pinned source tree of a dependency at a destination directory.
pub trait Fetcher {
  /// Populate `dest` (which does not exist yet) with the sources for `spec`.
  fn fetch(&self, spec: &PinSpec, dest: &Path) -> Result<(), FetchError>;
}

/// Fetches dependencies from git repositories.
#[derive(Debug, Clone, Default)]
pub struct GitFetcher;

impl Fetcher for GitFetcher {
  fn fetch(&self, spec: &PinSpec, dest: &Path) -> Result<(), FetchError> {
    let url = spec.source_url();
    info!(prefix = %spec.prefix, pin = %spec.pin, url = %url, "fetching dependency");

    let scratch = tempfile::Builder::new()
      .prefix("kang-git-")
      .tempdir()
      .map_err(FetchError::Scratch)?;

    let repo = clone_bare(&url, scratch.path())?;
    let rev = spec.pin.value();
    let tree = pinned_tree(&repo, &spec.pin)?;
    export_tree(&repo, tree, rev, dest)
  }
}

/// Clone `url` without a worktree, with every tag.
fn clone_bare(url: &str, path: &Path) -> Result<gix::Repository, FetchError> {
  let clone_err = |source: BoxError| FetchError::Clone {
    url: url.to_string(),
    source,
  };

  let prepared = gix::prepare_clone_bare(url, path).map_err(|e| clone_err(Box::new(e)))?;
  let mut prepared = prepared.configure_remote(|remote| Ok(remote.with_fetch_tags(Tags::All)));
  let (repo, _outcome) = prepared
    .fetch_only(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  debug!(url, path = %path.display(), "cloned repository");
  Ok(repo)
}

/// The tree id of the commit `pin` names.
///
/// Tags and versions are looked up as tags first; commits as any revision.
fn pinned_tree(repo: &gix::Repository, pin: &Pin) -> Result<gix::ObjectId, FetchError> {
  let rev = pin.value();
  let candidates = match pin {
    Pin::Tag(tag) | Pin::Version(tag) => vec![format!("refs/tags/{tag}"), tag.clone()],
    Pin::Commit(commit) => vec![commit.clone()],
  };

  let id = candidates
    .iter()
    .find_map(|candidate| repo.rev_parse_single(candidate.as_str()).ok())
    .ok_or_else(|| FetchError::RevisionNotFound { rev: rev.to_string() })?;

  let checkout_err = |source: BoxError| FetchError::Checkout {
    rev: rev.to_string(),
    source,
  };
  let commit = id
    .object()
    .map_err(|e| checkout_err(Box::new(e)))?
    .peel_to_commit()
    .map_err(|e| checkout_err(Box::new(e)))?;
  let tree = commit.tree_id().map_err(|e| checkout_err(Box::new(e)))?;

  debug!(rev, commit = %commit.id, "resolved revision");
  Ok(tree.detach())
}

/// Write every blob of `tree` below `dest`.
fn export_tree(repo: &gix::Repository, tree: gix::ObjectId, rev: &str, dest: &Path) -> Result<(), FetchError> {
  let checkout_err = |source: BoxError| FetchError::Checkout {
    rev: rev.to_string(),
    source,
  };
  let write_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| FetchError::Write { path, source }
  };

  let mut recorder = Recorder::default();
  repo
    .find_tree(tree)
    .map_err(|e| checkout_err(Box::new(e)))?
    .traverse()
    .breadthfirst(&mut recorder)
    .map_err(|e| checkout_err(Box::new(e)))?;

  fs::create_dir_all(dest).map_err(write_err(dest))?;
  let mut written = 0usize;
  for entry in recorder.records {
    let path = dest.join(gix::path::from_bstr(&entry.filepath));
    if entry.mode.is_tree() {
      fs::create_dir_all(&path).map_err(write_err(&path))?;
      continue;
    }
    if !entry.mode.is_blob() {
      // Symlinks and submodules are not part of a package's sources.
      trace!(path = %path.display(), "skipping non-file entry");
      continue;
    }

    let blob = repo.find_object(entry.oid).map_err(|e| checkout_err(Box::new(e)))?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err(parent))?;
    }
    fs::write(&path, &blob.data).map_err(write_err(&path))?;
    written += 1;
  }

  debug!(rev, files = written, dest = %dest.display(), "exported tree");
  Ok(())
}
