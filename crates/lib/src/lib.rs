//! kang-lib: the incremental build engine behind `kang`.
//!
//! The crate turns a project tree plus a `.kangfile` into compiled packages:
//! - `loader` / `resolve`: find local packages and fetch pinned external ones
//! - `constraint`: which source files a target and tag set selects
//! - `graph`: one node per import path, children before parents
//! - `stale`: which nodes need rebuilding, as an overlay on the graph
//! - `schedule`: memoized, dependency-ordered compile and link actions
//! - `pipeline`: all of the above in one call

pub mod cache;
pub mod config;
pub mod constraint;
pub mod consts;
pub mod context;
pub mod graph;
pub mod loader;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod resolve;
pub mod schedule;
pub mod stale;
pub mod stdlib;
pub mod toolchain;
pub mod util;
