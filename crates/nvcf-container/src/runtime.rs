//! Container runtime trait definition.

use std::future::Future;
use std::pin::Pin;

use super::config::ContainerConfig;
use super::error::{ContainerId, ContainerResult};
use super::status::{ContainerStatus, ContainerSummary};

/// Boxed future returned by [`ContainerRuntime`] methods.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = ContainerResult<T>> + Send + 'a>>;

/// Options for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Include all containers (not just running).
    pub all: bool,

    /// Filter by the image a container was created from.
    pub ancestor_filter: Option<String>,

    /// Filter by label (key=value).
    pub label_filter: Option<String>,
}

impl ListOptions {
    /// Create options for listing all containers.
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            ..Default::default()
        }
    }

    /// Filter by image.
    #[must_use]
    pub fn with_ancestor(mut self, image: impl Into<String>) -> Self {
        self.ancestor_filter = Some(image.into());
        self
    }

    /// Filter by a `key=value` label.
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.label_filter = Some(format!("{key}={value}"));
        self
    }
}

/// Options for stopping a container.
#[derive(Debug, Clone)]
pub struct StopOptions {
    /// Timeout in seconds before killing.
    pub timeout_secs: u32,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Force removal of running container.
    pub force: bool,
}

impl RemoveOptions {
    /// Create options with force removal.
    #[must_use]
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// Log retrieval options.
#[derive(Debug, Clone, Default)]
pub struct LogsOptions {
    /// Include stdout.
    pub stdout: bool,

    /// Include stderr.
    pub stderr: bool,
}

impl LogsOptions {
    /// Create options for all logs on both streams.
    #[must_use]
    pub fn all() -> Self {
        Self {
            stdout: true,
            stderr: true,
        }
    }
}

/// Container runtime trait for managing container lifecycle.
///
/// Object safe so a session and its interrupt handler can share one
/// `Arc<dyn ContainerRuntime>`.
pub trait ContainerRuntime: Send + Sync {
    /// Check that the engine is reachable.
    fn ping(&self) -> RuntimeFuture<'_, ()>;

    /// Pull an image into the local store.
    fn pull<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()>;

    /// Create a new container.
    fn create<'a>(&'a self, config: &'a ContainerConfig) -> RuntimeFuture<'a, ContainerId>;

    /// Start a container.
    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    /// Stop a container. Stopping an already stopped container succeeds.
    fn stop<'a>(&'a self, id: &'a ContainerId, options: &'a StopOptions) -> RuntimeFuture<'a, ()>;

    /// Remove a container.
    fn remove<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()>;

    /// Inspect a container.
    fn status<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ContainerStatus>;

    /// List containers.
    fn list<'a>(&'a self, options: &'a ListOptions) -> RuntimeFuture<'a, Vec<ContainerSummary>>;

    /// Get container logs (stdout and stderr interleaved).
    fn logs<'a>(&'a self, id: &'a ContainerId, options: &'a LogsOptions) -> RuntimeFuture<'a, Vec<u8>>;
}
