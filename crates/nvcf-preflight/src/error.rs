//! Error types for the pre-flight engine.
//!
//! Each stage has its own error enum so failures name the step that broke;
//! [`PreflightError`] wraps them with the stage context.

use std::time::Duration;

use nvcf_container::ContainerError;
use thiserror::Error;

use crate::grpc::GrpcError;
use crate::settings::SettingsError;

/// Readiness probing errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Every attempt in the schedule failed.
    #[error("container did not become healthy in time ({attempts} attempts over {}s)", waited.as_secs())]
    NotHealthyInTime {
        /// Attempts made.
        attempts: u32,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The probe target could not be turned into a client.
    #[error("invalid health target {target}: {reason}")]
    InvalidTarget {
        /// URL or address that was rejected.
        target: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// HTTP inference exercise errors. Only transport failures are errors; a
/// non-2xx status is reported, not raised.
#[derive(Debug, Error)]
pub enum HttpInferenceError {
    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Request could not be sent or no response arrived.
    #[error("failed to send inference request to {url}: {source}")]
    Send {
        /// Request URL.
        url: String,
        /// Transport error.
        source: reqwest::Error,
    },

    /// No response, or no complete non-streaming body, within the read
    /// timeout.
    #[error("timed out after {}s waiting for a response from {url}", timeout.as_secs())]
    Timeout {
        /// Request URL.
        url: String,
        /// Read timeout that elapsed.
        timeout: Duration,
    },

    /// The non-streaming body could not be read.
    #[error("failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    /// The event stream broke mid-read.
    #[error("failed to read streaming response: {0}")]
    ReadStream(#[source] std::io::Error),

    /// Writing progress output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Top-level pre-flight check error.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The check was misconfigured; nothing was launched.
    #[error("invalid check configuration: {0}")]
    Config(String),

    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The pre-launch sweep could not list containers.
    #[error("error during force cleanup: {0}")]
    ForceCleanup(#[source] ContainerError),

    /// The container could not be launched or exited right after start.
    #[error("error launching container: {0}")]
    Launch(#[source] ContainerError),

    /// Readiness never succeeded.
    #[error("error checking health endpoint: {0}")]
    Health(#[from] ProbeError),

    /// HTTP inference transport failure.
    #[error("error testing HTTP inference: {0}")]
    HttpInference(#[from] HttpInferenceError),

    /// gRPC connect, reflection, build or call failure.
    #[error("error testing gRPC inference: {0}")]
    GrpcInference(#[from] GrpcError),

    /// Interrupted by a shutdown signal; the container was cleaned up.
    #[error("interrupted by {signal}")]
    Interrupted {
        /// Signal name.
        signal: &'static str,
    },

    /// Writing progress output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl PreflightError {
    /// Whether the run stopped because of a shutdown signal.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
