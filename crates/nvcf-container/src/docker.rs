//! Docker runtime implementation using bollard.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptions as BollardLogsOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerState as BollardState, ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::config::ContainerConfig;
use super::error::{ContainerError, ContainerId, ContainerResult};
use super::runtime::{
    ContainerRuntime, ListOptions, LogsOptions, RemoveOptions, RuntimeFuture, StopOptions,
};
use super::status::{ContainerState, ContainerStatus, ContainerSummary};

/// Docker container runtime implementation.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to Docker daemon using default connection method
    /// (`DOCKER_HOST` or the local socket).
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub fn connect() -> ContainerResult<Self> {
        let client = Docker::connect_with_local_defaults().map_err(|e| {
            ContainerError::ConnectionFailed(format!("failed to connect to Docker: {e}"))
        })?;

        Ok(Self { client })
    }

    /// Build Docker `HostConfig` from our config types.
    fn build_host_config(config: &ContainerConfig) -> HostConfig {
        let mut host_config = HostConfig::default();

        if !config.ports.is_empty() {
            let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
            for mapping in &config.ports {
                bindings
                    .entry(mapping.port_key())
                    .or_insert_with(|| Some(Vec::new()))
                    .get_or_insert_with(Vec::new)
                    .push(PortBinding {
                        host_ip: Some(mapping.host_ip.clone()),
                        host_port: Some(mapping.host_port.to_string()),
                    });
            }
            host_config.port_bindings = Some(bindings);
        }

        host_config
    }

    /// Convert bollard state to our `ContainerState`.
    fn bollard_state_to_state(state: Option<&BollardState>) -> ContainerState {
        let Some(s) = state else {
            return ContainerState::Unknown;
        };

        if s.running == Some(true) {
            ContainerState::Running
        } else if s.paused == Some(true) {
            ContainerState::Paused
        } else if s.restarting == Some(true) {
            ContainerState::Starting
        } else if s.dead == Some(true) {
            ContainerState::Error
        } else {
            match &s.status {
                Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
                Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
                Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
                Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
                Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Starting,
                Some(ContainerStateStatusEnum::DEAD) => ContainerState::Error,
                Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Stopping,
                _ => ContainerState::Unknown,
            }
        }
    }

    /// Map the state string reported by a container listing.
    fn summary_state(state: Option<&str>) -> ContainerState {
        match state {
            Some("running") => ContainerState::Running,
            Some("paused") => ContainerState::Paused,
            Some("created") => ContainerState::Created,
            Some("restarting") => ContainerState::Starting,
            Some("removing") => ContainerState::Stopping,
            Some("exited") => ContainerState::Exited,
            Some("dead") => ContainerState::Error,
            _ => ContainerState::Unknown,
        }
    }

    fn is_status(err: &BollardError, code: u16) -> bool {
        matches!(
            err,
            BollardError::DockerResponseServerError { status_code, .. } if *status_code == code
        )
    }
}

impl ContainerRuntime for DockerRuntime {
    fn ping(&self) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.client
                .ping()
                .await
                .map(|_| ())
                .map_err(|e| ContainerError::ConnectionFailed(e.to_string()))
        })
    }

    fn pull<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            info!(image = %image, "pulling image");

            let options = CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            };

            let mut stream = self.client.create_image(Some(options), None, None);
            while let Some(progress) = stream.next().await {
                match progress {
                    Ok(info) => {
                        if let Some(status) = info.status {
                            debug!(image = %image, status = %status, "pull progress");
                        }
                    }
                    Err(e) => {
                        return Err(ContainerError::PullFailed {
                            image: image.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            Ok(())
        })
    }

    fn create<'a>(&'a self, config: &'a ContainerConfig) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            config.validate()?;

            debug!(name = %config.name, image = %config.image, "creating container");

            let exposed_ports: HashMap<String, HashMap<(), ()>> = config
                .ports
                .iter()
                .map(|p| (p.port_key(), HashMap::new()))
                .collect();

            let docker_config = Config {
                image: Some(config.image.clone()),
                labels: Some(config.labels.clone()),
                exposed_ports: if exposed_ports.is_empty() {
                    None
                } else {
                    Some(exposed_ports)
                },
                host_config: Some(Self::build_host_config(config)),
                ..Default::default()
            };

            let options = CreateContainerOptions {
                name: config.name.clone(),
                platform: None,
            };

            let response = self
                .client
                .create_container(Some(options), docker_config)
                .await
                .map_err(|e| match e {
                    BollardError::DockerResponseServerError {
                        status_code: 404, ..
                    } => ContainerError::ImageNotFound {
                        image: config.image.clone(),
                    },
                    BollardError::DockerResponseServerError {
                        status_code: 409,
                        message,
                    } => ContainerError::CreateFailed(format!(
                        "container already exists: {message}"
                    )),
                    _ => ContainerError::CreateFailed(e.to_string()),
                })?;

            for warning in &response.warnings {
                warn!(name = %config.name, warning = %warning, "engine warning on create");
            }

            info!(id = %response.id, name = %config.name, "container created");

            Ok(ContainerId::new_unchecked(response.id))
        })
    }

    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, "starting container");

            self.client
                .start_container::<String>(id.as_str(), None)
                .await
                .map_err(|e| {
                    if Self::is_status(&e, 404) {
                        ContainerError::NotFound { id: id.to_string() }
                    } else {
                        ContainerError::StartFailed {
                            id: id.to_string(),
                            reason: e.to_string(),
                        }
                    }
                })?;

            info!(id = %id, "container started");
            Ok(())
        })
    }

    fn stop<'a>(&'a self, id: &'a ContainerId, options: &'a StopOptions) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, "stopping container");

            let stop_options = StopContainerOptions {
                t: i64::from(options.timeout_secs),
            };

            match self
                .client
                .stop_container(id.as_str(), Some(stop_options))
                .await
            {
                Ok(()) => {
                    info!(id = %id, "container stopped");
                    Ok(())
                }
                // Already stopped
                Err(e) if Self::is_status(&e, 304) => Ok(()),
                Err(e) if Self::is_status(&e, 404) => {
                    Err(ContainerError::NotFound { id: id.to_string() })
                }
                Err(e) => Err(ContainerError::StopFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                }),
            }
        })
    }

    fn remove<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            debug!(id = %id, force = options.force, "removing container");

            let remove_options = RemoveContainerOptions {
                force: options.force,
                ..Default::default()
            };

            self.client
                .remove_container(id.as_str(), Some(remove_options))
                .await
                .map_err(|e| {
                    if Self::is_status(&e, 404) {
                        ContainerError::NotFound { id: id.to_string() }
                    } else {
                        ContainerError::RemoveFailed {
                            id: id.to_string(),
                            reason: e.to_string(),
                        }
                    }
                })?;

            info!(id = %id, "container removed");
            Ok(())
        })
    }

    fn status<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ContainerStatus> {
        Box::pin(async move {
            let inspect = self
                .client
                .inspect_container(id.as_str(), None::<InspectContainerOptions>)
                .await
                .map_err(|e| {
                    if Self::is_status(&e, 404) {
                        ContainerError::NotFound { id: id.to_string() }
                    } else {
                        ContainerError::InspectFailed {
                            id: id.to_string(),
                            reason: e.to_string(),
                        }
                    }
                })?;

            Ok(ContainerStatus {
                id: inspect.id.unwrap_or_else(|| id.as_str().to_string()),
                image: inspect
                    .config
                    .as_ref()
                    .and_then(|c| c.image.clone())
                    .unwrap_or_default(),
                state: Self::bollard_state_to_state(inspect.state.as_ref()),
                exit_code: inspect.state.as_ref().and_then(|s| s.exit_code),
                error: inspect
                    .state
                    .as_ref()
                    .and_then(|s| s.error.clone())
                    .filter(|e| !e.is_empty()),
            })
        })
    }

    fn list<'a>(&'a self, options: &'a ListOptions) -> RuntimeFuture<'a, Vec<ContainerSummary>> {
        Box::pin(async move {
            let mut filters: HashMap<String, Vec<String>> = HashMap::new();

            if let Some(ref image) = options.ancestor_filter {
                filters.insert("ancestor".to_string(), vec![image.clone()]);
            }
            if let Some(ref label) = options.label_filter {
                filters.insert("label".to_string(), vec![label.clone()]);
            }

            let list_options = ListContainersOptions {
                all: options.all,
                filters,
                ..Default::default()
            };

            let containers = self
                .client
                .list_containers(Some(list_options))
                .await
                .map_err(|e| ContainerError::ListFailed(e.to_string()))?;

            Ok(containers
                .into_iter()
                .map(|c| ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    name: c
                        .names
                        .and_then(|n| n.first().cloned())
                        .map(|n| n.trim_start_matches('/').to_string())
                        .unwrap_or_default(),
                    image: c.image.unwrap_or_default(),
                    state: Self::summary_state(c.state.as_deref()),
                    status_message: c.status.unwrap_or_default(),
                })
                .collect())
        })
    }

    fn logs<'a>(&'a self, id: &'a ContainerId, options: &'a LogsOptions) -> RuntimeFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let log_options = BollardLogsOptions::<String> {
                stdout: options.stdout,
                stderr: options.stderr,
                tail: "all".to_string(),
                follow: false,
                ..Default::default()
            };

            let mut stream = self.client.logs(id.as_str(), Some(log_options));
            let mut output = Vec::new();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(chunk) => output.extend_from_slice(&chunk.into_bytes()),
                    Err(e) if output.is_empty() => {
                        return Err(ContainerError::LogsFailed {
                            id: id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "error reading logs");
                        break;
                    }
                }
            }

            Ok(output)
        })
    }
}
