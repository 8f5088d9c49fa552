//! End-to-end tests driving the build pipeline with a fake toolchain.

mod common;

mod build_tests;
mod cache_tests;
mod error_tests;
