//! Target platform descriptors.

pub mod arch;
pub mod os;

use std::fmt;

use thiserror::Error;

pub use arch::Arch;
pub use os::Os;

/// Errors parsing a platform from user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
  #[error("unknown operating system '{0}'")]
  UnknownOs(String),

  #[error("unknown architecture '{0}'")]
  UnknownArch(String),

  #[error("unsupported host platform {os}/{arch}")]
  UnsupportedHost { os: String, arch: String },
}

/// Platform identifier combining OS and architecture (e.g., "linux/amd64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the host platform at runtime
  pub fn host() -> Result<Self, PlatformError> {
    match (Os::current(), Arch::current()) {
      (Some(os), Some(arch)) => Ok(Self { os, arch }),
      _ => Err(PlatformError::UnsupportedHost {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
      }),
    }
  }

  /// Directory component for per-platform object trees (e.g., "linux_amd64")
  pub fn dir_name(&self) -> String {
    format!("{}_{}", self.os, self.arch)
  }

  /// Suffix used to tell cross-compiled binaries apart (e.g., "-linux-amd64")
  pub fn binary_suffix(&self) -> String {
    format!("-{}-{}", self.os, self.arch)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.os, self.arch)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_formats() {
    let platform = Platform::new(Os::Linux, Arch::Amd64);
    assert_eq!(platform.to_string(), "linux/amd64");
    assert_eq!(platform.dir_name(), "linux_amd64");
    assert_eq!(platform.binary_suffix(), "-linux-amd64");
  }

  #[test]
  fn host_is_detected() {
    assert!(Platform::host().is_ok());
  }
}
