//! Names and sizes shared across the crate.

/// Application name, used for log targets and lock metadata.
pub const APP_NAME: &str = "kang";

/// Conventional configuration file name, searched for in ancestor directories.
pub const CONFIG_FILENAME: &str = ".kangfile";

/// Directory (relative to the project root) holding fetched dependency trees.
pub const CACHE_DIR_NAME: &str = ".cache";

/// Directory (relative to the project root) holding compiled package objects.
pub const STATE_DIR_NAME: &str = ".kang";

/// Directory (relative to the project root) receiving linked binaries.
pub const BIN_DIR_NAME: &str = "bin";

/// Marker written into a cache entry once its source tree is complete.
pub const CACHE_COMPLETE_MARKER: &str = ".kang-complete";

/// Extension of compiled package archives.
pub const OBJECT_EXT: &str = "a";

/// Extension of package source files.
pub const SOURCE_EXT: &str = "go";

/// Number of leading digest bytes used for the first cache shard level.
pub const CACHE_SHARD_BYTES: usize = 1;
