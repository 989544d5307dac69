//! # nvcf-cli
//!
//! NVCF command-line interface.
//!
//! Provides commands for:
//! - Local pre-flight checks of function containers (`nvcf check`)
//!
//! # Architecture
//!
//! The CLI drives a [`nvcf_preflight::SmokeTest`] over the local Docker
//! engine. Progress is streamed to stdout in table mode; JSON mode prints a
//! single report once the check completes.
//!
//! ```text
//! ┌───────────┐   SmokeTest   ┌────────────────┐   bollard   ┌────────┐
//! │  nvcf-cli │──────────────►│ nvcf-preflight │────────────►│ Docker │
//! └───────────┘               └────────────────┘             └────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{CheckArgs, Cli, Commands, Format, ProtocolArg};
pub use error::CliError;
pub use output::OutputFormat;
