//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`check`] - Local pre-flight smoke test

pub mod check;

pub use check::CheckCommand;
