//! Container status and state types.

use serde::{Deserialize, Serialize};

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContainerState {
    /// Container has been created but not started.
    Created,

    /// Container is restarting.
    Starting,

    /// Container is running.
    Running,

    /// Container is paused.
    Paused,

    /// Container is being removed.
    Stopping,

    /// Container has exited.
    Exited,

    /// Container is dead.
    Error,

    /// Container state is unknown.
    #[default]
    Unknown,
}

impl ContainerState {
    /// Check if container is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if container is terminal (won't change without intervention).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Error)
    }

    /// Get state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Exited => "exited",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Full container ID.
    pub id: String,

    /// Image the container was created from.
    pub image: String,

    /// Current state.
    pub state: ContainerState,

    /// Exit code, once exited.
    pub exit_code: Option<i64>,

    /// Engine-reported error, if any.
    pub error: Option<String>,
}

/// Summary entry returned by a container listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: String,

    /// Container name.
    pub name: String,

    /// Image name.
    pub image: String,

    /// Current state.
    pub state: ContainerState,

    /// Status message (e.g., "Up 2 hours", "Exited (0) 5 minutes ago").
    pub status_message: String,
}
