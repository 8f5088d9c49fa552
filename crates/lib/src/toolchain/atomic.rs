//! Atomic publication of build artifacts.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::Builder;

use super::ToolchainError;

/// Produce `dest` through a temporary file in the same directory.
///
/// `produce` writes the artifact to the path it is given. On success the
/// temporary file is renamed over `dest`; on failure it is removed and any
/// existing `dest` is left untouched.
pub fn publish<F>(dest: &Path, produce: F) -> Result<(), ToolchainError>
where
  F: FnOnce(&Path) -> Result<(), ToolchainError>,
{
  let dir = dest.parent().ok_or_else(|| ToolchainError::Publish {
    path: dest.to_path_buf(),
    source: io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no parent directory"),
  })?;
  fs::create_dir_all(dir).map_err(|source| ToolchainError::Publish {
    path: dir.to_path_buf(),
    source,
  })?;

  let staging = Builder::new()
    .prefix(".tmp-")
    .tempfile_in(dir)
    .map_err(|source| ToolchainError::Publish {
      path: dest.to_path_buf(),
      source,
    })?;

  produce(staging.path())?;

  staging.persist(dest).map_err(|err| ToolchainError::Publish {
    path: dest.to_path_buf(),
    source: err.error,
  })?;
  Ok(())
}
