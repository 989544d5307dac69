//! # nvcf-container
//!
//! Local container engine access for NVCF pre-flight checks.
//!
//! The [`ContainerRuntime`] trait is the minimal imperative surface the
//! smoke test needs from an engine: pull, create, start, inspect, logs,
//! stop, remove, and list by image. [`DockerRuntime`] implements it over the
//! Docker API via bollard; [`FakeRuntime`] implements it in memory for tests.
//!
//! ```rust,ignore
//! use nvcf_container::{ContainerConfig, ContainerRuntime, DockerRuntime, PortMapping};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = DockerRuntime::connect()?;
//! let config = ContainerConfig::new("nvcf-preflight-demo", "my-model:latest")
//!     .with_port(PortMapping::new(8000, 18080, "127.0.0.1"));
//!
//! let id = runtime.create(&config).await?;
//! runtime.start(&id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod docker;
pub mod error;
pub mod fake;
pub mod runtime;
pub mod status;

pub use config::{ContainerConfig, PortMapping};
pub use docker::DockerRuntime;
pub use error::{ContainerError, ContainerId, ContainerResult};
pub use fake::FakeRuntime;
pub use runtime::{
    ContainerRuntime, ListOptions, LogsOptions, RemoveOptions, RuntimeFuture, StopOptions,
};
pub use status::{ContainerState, ContainerStatus, ContainerSummary};
