//! # nvcf-preflight
//!
//! Local smoke test for NVCF function containers.
//!
//! Before a function is deployed, the check launches its image on the
//! local engine, waits for it to report healthy over HTTP or the standard
//! gRPC health protocol, makes one inference call, and removes the
//! container on every exit path.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nvcf_container::DockerRuntime;
//! use nvcf_preflight::{CheckConfig, InferenceTarget, PreflightSettings, SmokeTest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let config = CheckConfig::new("my-model:latest", 8000)
//!     .with_inference(InferenceTarget::http("/v1/infer", r#"{"prompt": "hi"}"#)?);
//!
//! let report = SmokeTest::new(runtime, PreflightSettings::default())
//!     .run(&config, &mut std::io::stdout())
//!     .await?;
//! println!("healthy after {} attempts", report.health.attempts);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod check;
pub mod config;
pub mod error;
pub mod grpc;
pub mod http;
pub mod probe;
pub mod report;
pub mod session;
pub mod settings;
pub mod signal;

pub use check::SmokeTest;
pub use config::{
    CheckConfig, DEFAULT_HEALTH_ENDPOINT, DEFAULT_WAIT_SECONDS, InferenceTarget, Protocol,
};
pub use error::{HttpInferenceError, PreflightError, ProbeError};
pub use grpc::{FieldError, GrpcError, GrpcInvocation, GrpcInvoker};
pub use http::{HttpInferenceClient, HttpInferenceReply, ReplyBody};
pub use probe::{
    GrpcHealthProbe, HealthProbe, HttpHealthProbe, PollSchedule, ProbeOutcome, wait_healthy,
};
pub use report::{CheckReport, HealthReport, InferenceReport};
pub use session::{LaunchedContainer, SmokeTestSession, SweepReport};
pub use settings::{PreflightSettings, SettingsError};
pub use signal::shutdown_signal;
