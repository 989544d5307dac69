//! Container runtime error types.

use std::fmt;
use thiserror::Error;

/// Container runtime errors.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine.
    #[error("failed to connect to Docker daemon: {0}")]
    ConnectionFailed(String),

    /// Container not found.
    #[error("container not found: {id}")]
    NotFound {
        /// Container ID.
        id: String,
    },

    /// Image not found locally.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// Image name.
        image: String,
    },

    /// Image pull failed.
    #[error("failed to pull image {image}: {reason}")]
    PullFailed {
        /// Image name.
        image: String,
        /// Failure reason.
        reason: String,
    },

    /// Container creation failed.
    #[error("failed to create container: {0}")]
    CreateFailed(String),

    /// Container start failed.
    #[error("failed to start container {id}: {reason}")]
    StartFailed {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// Container inspection failed.
    #[error("failed to inspect container {id}: {reason}")]
    InspectFailed {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// The container stopped during its settle delay.
    #[error("container exited unexpectedly. Logs:\n{logs}")]
    ExitedOnStart {
        /// Container ID.
        id: String,
        /// Captured stdout/stderr of the dead container.
        logs: String,
    },

    /// Logs could not be retrieved.
    #[error("failed to fetch logs for container {id}: {reason}")]
    LogsFailed {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// Container stop failed.
    #[error("failed to stop container {id}: {reason}")]
    StopFailed {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// Container remove failed.
    #[error("failed to remove container {id}: {reason}")]
    RemoveFailed {
        /// Container ID.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// Container listing failed.
    #[error("failed to list containers: {0}")]
    ListFailed(String),

    /// Invalid configuration.
    #[error("invalid container configuration: {0}")]
    InvalidConfig(String),
}

impl ContainerError {
    /// Whether the error means the container is already gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for container operations.
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// Container ID wrapper for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new container ID from a string.
    ///
    /// # Errors
    ///
    /// Returns error if ID is empty or contains invalid characters.
    pub fn new(id: impl Into<String>) -> ContainerResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContainerError::InvalidConfig(
                "container ID cannot be empty".to_string(),
            ));
        }
        // Engine IDs are hex; names allow a few more characters.
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ContainerError::InvalidConfig(format!(
                "invalid container ID: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Create a container ID without validation (for IDs returned by the engine).
    #[must_use]
    pub(crate) fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short form (first 12 chars) of the container ID.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_valid_hex() {
        let id = ContainerId::new("abc123def456").expect("valid hex ID");
        assert_eq!(id.as_str(), "abc123def456");
        assert_eq!(id.short(), "abc123def456");
    }

    #[test]
    fn test_container_id_short_form() {
        let id = ContainerId::new("abc123def456789012345678").expect("valid long hex ID");
        assert_eq!(id.short(), "abc123def456");
        assert_eq!(format!("{id}"), "abc123def456");
    }

    #[test]
    fn test_container_id_rejects_empty_and_spaces() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("my container!").is_err());
    }

    #[test]
    fn test_container_id_into_string() {
        let id = ContainerId::new_unchecked("nvcf-preflight-1");
        let s: String = id.into();
        assert_eq!(s, "nvcf-preflight-1");
    }

    #[test]
    fn test_exited_on_start_carries_logs() {
        let err = ContainerError::ExitedOnStart {
            id: "abc".to_string(),
            logs: "ModuleNotFoundError: tritonserver".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("container exited unexpectedly. Logs:\n"));
        assert!(msg.contains("ModuleNotFoundError"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(ContainerError::NotFound { id: "x".into() }.is_not_found());
        assert!(!ContainerError::ListFailed("boom".into()).is_not_found());
    }
}
