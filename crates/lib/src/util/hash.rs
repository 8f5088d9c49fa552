//! Hashing utilities for content-addressed storage.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `ShardedHash`: a digest split into a short shard prefix and the remainder,
//!   used to spread cache entries over a two-level directory tree

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// A full 64-character SHA256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A SHA-256 digest split at a byte boundary.
///
/// `shard` is the hex encoding of the first `shard_bytes` bytes, `rest` the hex
/// encoding of the remaining bytes. Joined, they equal the full digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardedHash {
  pub shard: String,
  pub rest: String,
}

impl ShardedHash {
  /// Directory for this hash under `root`: `root/<shard>/<rest>`.
  pub fn dir_under(&self, root: &Path) -> PathBuf {
    root.join(&self.shard).join(&self.rest)
  }

  /// The full digest, unsplit.
  pub fn full(&self) -> ContentHash {
    ContentHash(format!("{}{}", self.shard, self.rest))
  }
}

/// Hash arbitrary bytes and split the digest after `shard_bytes` bytes.
///
/// `shard_bytes` is clamped to the digest length.
pub fn sharded_hash(data: &[u8], shard_bytes: usize) -> ShardedHash {
  let digest = Sha256::digest(data);
  let split = shard_bytes.min(digest.len());
  ShardedHash {
    shard: hex::encode(&digest[..split]),
    rest: hex::encode(&digest[split..]),
  }
}
