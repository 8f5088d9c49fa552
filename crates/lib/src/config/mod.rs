//! Project configuration (`.kangfile`).
//!
//! The configuration names the project's import path prefix and lists the
//! pinned external dependencies, in the order resolution should consult them:
//!
//! ```toml
//! project = "github.com/constabulary/kang"
//!
//! [[dependency]]
//! prefix = "example.org/lib"
//! tag = "v1.2.0"
//! ```

mod types;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::CONFIG_FILENAME;

pub use types::*;

/// Errors that can occur while locating or reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// No configuration file in the start directory or any ancestor.
  #[error("no {CONFIG_FILENAME} found in {} or any parent directory", start.display())]
  NotFound { start: PathBuf },

  /// Failed to read the configuration file.
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The file is not valid TOML or has unknown fields.
  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  /// The `project` key is missing or empty.
  #[error("{}: missing required 'project' prefix", path.display())]
  MissingProject { path: PathBuf },

  /// A dependency entry does not have exactly one pin.
  #[error("{}: dependency '{prefix}' {reason}", path.display())]
  InvalidPin {
    path: PathBuf,
    prefix: String,
    reason: String,
  },
}

/// Find the nearest configuration file at or above `start`.
pub fn find_config(start: &Path) -> Result<PathBuf, ConfigError> {
  start
    .ancestors()
    .map(|dir| dir.join(CONFIG_FILENAME))
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| ConfigError::NotFound {
      start: start.to_path_buf(),
    })
}

/// Read and validate the configuration file at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
  let path = dunce::canonicalize(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
    path: path.clone(),
    source,
  })?;
  parse(&content, &path)
}

/// Parse and validate configuration text read from `path`.
pub fn parse(content: &str, path: &Path) -> Result<Config, ConfigError> {
  let raw: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })?;

  let project = raw
    .project
    .map(|p| p.trim().trim_end_matches('/').to_string())
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ConfigError::MissingProject {
      path: path.to_path_buf(),
    })?;

  let dependencies = raw
    .dependencies
    .into_iter()
    .map(|dep| validate_dependency(dep, path))
    .collect::<Result<Vec<_>, _>>()?;

  debug!(project = %project, dependencies = dependencies.len(), "loaded configuration");

  Ok(Config {
    path: path.to_path_buf(),
    root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
    project,
    dependencies,
  })
}

fn validate_dependency(dep: RawDependency, path: &Path) -> Result<PinSpec, ConfigError> {
  let prefix = dep.prefix.trim().trim_end_matches('/').to_string();
  let invalid = |reason: &str| ConfigError::InvalidPin {
    path: path.to_path_buf(),
    prefix: prefix.clone(),
    reason: reason.to_string(),
  };

  if prefix.is_empty() {
    return Err(invalid("has an empty prefix"));
  }

  let pin = match (dep.version, dep.tag, dep.commit) {
    (Some(v), None, None) => Pin::Version(v),
    (None, Some(t), None) => Pin::Tag(t),
    (None, None, Some(c)) => Pin::Commit(c),
    (None, None, None) => return Err(invalid("must set one of version, tag or commit")),
    _ => return Err(invalid("must set only one of version, tag or commit")),
  };

  if pin.value().is_empty() {
    return Err(invalid("has an empty pin value"));
  }

  Ok(PinSpec {
    prefix,
    pin,
    source: dep.source,
  })
}
