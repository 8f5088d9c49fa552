//! Configuration types.
//!
//! - [`RawConfig`] / [`RawDependency`] - the `.kangfile` as written on disk
//! - [`Pin`] - exactly one of version, tag or commit
//! - [`PinSpec`] - a resolution rule for every import path under a prefix
//! - [`Config`] - the validated project configuration

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The `.kangfile` as parsed from TOML, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
  /// Import path prefix of the project's own packages.
  pub project: Option<String>,

  /// Dependency rules, in declaration order.
  #[serde(default, rename = "dependency")]
  pub dependencies: Vec<RawDependency>,
}

/// One `[[dependency]]` entry as written.
///
/// Exactly one of `version`, `tag` and `commit` must be set; validation turns
/// this into a [`PinSpec`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDependency {
  pub prefix: String,
  pub version: Option<String>,
  pub tag: Option<String>,
  pub commit: Option<String>,
  /// Fetch URL; defaults to `https://<prefix>`.
  pub source: Option<String>,
}

/// How a dependency is pinned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Pin {
  Version(String),
  Tag(String),
  Commit(String),
}

impl Pin {
  /// The pin kind as written in configuration.
  pub fn kind(&self) -> &'static str {
    match self {
      Pin::Version(_) => "version",
      Pin::Tag(_) => "tag",
      Pin::Commit(_) => "commit",
    }
  }

  /// The pinned value (version string, tag name or commit id).
  pub fn value(&self) -> &str {
    match self {
      Pin::Version(v) | Pin::Tag(v) | Pin::Commit(v) => v,
    }
  }
}

impl fmt::Display for Pin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", self.kind(), self.value())
  }
}

/// A resolution rule: every import path under `prefix` comes from `pin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PinSpec {
  pub prefix: String,
  pub pin: Pin,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

impl PinSpec {
  pub fn new(prefix: impl Into<String>, pin: Pin) -> Self {
    Self {
      prefix: prefix.into(),
      pin,
      source: None,
    }
  }

  /// Whether `import_path` falls under this rule's prefix.
  ///
  /// Matches whole path elements only: `example.org/lib` matches
  /// `example.org/lib` and `example.org/lib/sub`, not `example.org/library`.
  pub fn matches(&self, import_path: &str) -> bool {
    match import_path.strip_prefix(self.prefix.as_str()) {
      Some(rest) => rest.is_empty() || rest.starts_with('/'),
      None => false,
    }
  }

  /// Bytes hashed to address this rule's cache entry: prefix, kind, `=`, value.
  pub fn cache_key_material(&self) -> String {
    format!("{}{}", self.prefix, self.pin)
  }

  /// URL the fetcher clones from.
  pub fn source_url(&self) -> String {
    self
      .source
      .clone()
      .unwrap_or_else(|| format!("https://{}", self.prefix))
  }
}

impl fmt::Display for PinSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.prefix, self.pin)
  }
}

/// Validated project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Path of the file this configuration was read from.
  pub path: PathBuf,
  /// Directory containing the configuration file.
  pub root: PathBuf,
  /// Import path prefix of the project's own packages.
  pub project: String,
  /// Dependency rules in declaration order.
  pub dependencies: Vec<PinSpec>,
}
