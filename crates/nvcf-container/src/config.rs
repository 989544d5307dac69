//! Container configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::{ContainerError, ContainerResult};

/// A container port published on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port the server listens on inside the container.
    pub container_port: u16,

    /// Port on the host the container port is published to.
    pub host_port: u16,

    /// Host interface to bind (e.g. "127.0.0.1").
    pub host_ip: String,
}

impl PortMapping {
    /// Publish `container_port` on `host_ip:host_port`.
    #[must_use]
    pub fn new(container_port: u16, host_port: u16, host_ip: impl Into<String>) -> Self {
        Self {
            container_port,
            host_port,
            host_ip: host_ip.into(),
        }
    }

    /// Engine port key, e.g. `8000/tcp`.
    #[must_use]
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// Configuration for a container to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container name (must be unique).
    pub name: String,

    /// Image to run (e.g., "nvcr.io/nim/meta/llama3-8b-instruct:latest").
    pub image: String,

    /// Published ports.
    pub ports: Vec<PortMapping>,

    /// Labels for container metadata.
    pub labels: HashMap<String, String>,
}

impl ContainerConfig {
    /// Create a new container config with minimal settings.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Publish a port.
    #[must_use]
    pub fn with_port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> ContainerResult<()> {
        if self.name.is_empty() {
            return Err(ContainerError::InvalidConfig(
                "container name cannot be empty".to_string(),
            ));
        }

        if self.image.is_empty() {
            return Err(ContainerError::InvalidConfig(
                "image cannot be empty".to_string(),
            ));
        }

        // Docker naming rules
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ContainerError::InvalidConfig(format!(
                "invalid container name: {}",
                self.name
            )));
        }

        for port in &self.ports {
            if port.container_port == 0 || port.host_port == 0 {
                return Err(ContainerError::InvalidConfig(format!(
                    "invalid port mapping {}:{}",
                    port.host_port, port.container_port
                )));
            }
        }

        Ok(())
    }
}
