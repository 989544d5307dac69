//! In-memory fake runtime for testing.
//!
//! Behaves like a local engine that never actually runs anything: created
//! containers are "running" once started unless their image was marked with
//! [`FakeRuntime::exit_on_start`]. Individual stop/remove failures can be
//! injected to exercise best-effort cleanup paths.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;

use super::config::ContainerConfig;
use super::error::{ContainerError, ContainerId};
use super::runtime::{
    ContainerRuntime, ListOptions, LogsOptions, RemoveOptions, RuntimeFuture, StopOptions,
};
use super::status::{ContainerState, ContainerStatus, ContainerSummary};

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    image: String,
    state: ContainerState,
    labels: HashMap<String, String>,
    logs: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    next_id: u64,
    local_images: Option<HashSet<String>>,
    exit_on_start: HashMap<String, Vec<String>>,
    fail_stop: HashSet<String>,
    fail_remove: HashSet<String>,
    unreachable: bool,
    events: Vec<String>,
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    /// Create a new fake runtime where every image is available locally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the listed images exist locally; others must be pulled first.
    #[must_use]
    pub fn with_local_images<I, S>(self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().local_images = Some(images.into_iter().map(Into::into).collect());
        self
    }

    /// Containers from `image` exit right after start, printing `logs`.
    #[must_use]
    pub fn exit_on_start(self, image: impl Into<String>, logs: Vec<String>) -> Self {
        self.state.lock().exit_on_start.insert(image.into(), logs);
        self
    }

    /// Every `ping` fails as if the daemon were down.
    #[must_use]
    pub fn unreachable(self) -> Self {
        self.state.lock().unreachable = true;
        self
    }

    /// Make `stop` fail for the given container.
    pub fn fail_stop(&self, id: &ContainerId) {
        self.state.lock().fail_stop.insert(id.as_str().to_string());
    }

    /// Make `remove` fail for the given container.
    pub fn fail_remove(&self, id: &ContainerId) {
        self.state.lock().fail_remove.insert(id.as_str().to_string());
    }

    /// Drop any injected stop/remove failures for the given container.
    pub fn clear_failures(&self, id: &ContainerId) {
        let mut state = self.state.lock();
        state.fail_stop.remove(id.as_str());
        state.fail_remove.remove(id.as_str());
    }

    /// Add a container left behind by an earlier run.
    pub fn seed(&self, image: impl Into<String>, state: ContainerState) -> ContainerId {
        let mut guard = self.state.lock();
        let id = Self::generate_id(&mut guard);
        guard.containers.insert(
            id.clone(),
            FakeContainer {
                name: format!("leftover-{id}"),
                image: image.into(),
                state,
                labels: HashMap::new(),
                logs: Vec::new(),
            },
        );
        ContainerId::new_unchecked(id)
    }

    /// Get the number of containers.
    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    /// State of a container, if it still exists.
    pub fn state_of(&self, id: &ContainerId) -> Option<ContainerState> {
        self.state.lock().containers.get(id.as_str()).map(|c| c.state)
    }

    /// Operations performed so far, e.g. `create:echo:http`, `remove:container-00000001`.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    fn generate_id(state: &mut FakeState) -> String {
        state.next_id += 1;
        format!("container-{:08x}", state.next_id)
    }

    fn not_found(id: &ContainerId) -> ContainerError {
        ContainerError::NotFound {
            id: id.as_str().to_string(),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn ping(&self) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            if self.state.lock().unreachable {
                return Err(ContainerError::ConnectionFailed(
                    "daemon is not running".to_string(),
                ));
            }
            Ok(())
        })
    }

    fn pull<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.events.push(format!("pull:{image}"));
            if let Some(images) = state.local_images.as_mut() {
                images.insert(image.to_string());
            }
            Ok(())
        })
    }

    fn create<'a>(&'a self, config: &'a ContainerConfig) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            config.validate()?;

            let mut state = self.state.lock();
            state.events.push(format!("create:{}", config.image));

            let available = state
                .local_images
                .as_ref()
                .is_none_or(|images| images.contains(&config.image));
            if !available {
                return Err(ContainerError::ImageNotFound {
                    image: config.image.clone(),
                });
            }

            if state.containers.values().any(|c| c.name == config.name) {
                return Err(ContainerError::CreateFailed(format!(
                    "container already exists: {}",
                    config.name
                )));
            }

            let id = Self::generate_id(&mut state);
            state.containers.insert(
                id.clone(),
                FakeContainer {
                    name: config.name.clone(),
                    image: config.image.clone(),
                    state: ContainerState::Created,
                    labels: config.labels.clone(),
                    logs: vec!["Starting container...".to_string()],
                },
            );

            Ok(ContainerId::new_unchecked(id))
        })
    }

    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.events.push(format!("start:{}", id.as_str()));

            let exit_logs = {
                let container = state
                    .containers
                    .get(id.as_str())
                    .ok_or_else(|| Self::not_found(id))?;
                state.exit_on_start.get(&container.image).cloned()
            };

            let container = state
                .containers
                .get_mut(id.as_str())
                .ok_or_else(|| Self::not_found(id))?;

            match exit_logs {
                Some(lines) => {
                    container.logs.extend(lines);
                    container.state = ContainerState::Exited;
                }
                None => container.state = ContainerState::Running,
            }
            Ok(())
        })
    }

    fn stop<'a>(&'a self, id: &'a ContainerId, _options: &'a StopOptions) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.events.push(format!("stop:{}", id.as_str()));

            if state.fail_stop.contains(id.as_str()) {
                return Err(ContainerError::StopFailed {
                    id: id.as_str().to_string(),
                    reason: "injected stop failure".to_string(),
                });
            }

            let container = state
                .containers
                .get_mut(id.as_str())
                .ok_or_else(|| Self::not_found(id))?;
            container.state = ContainerState::Exited;
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        id: &'a ContainerId,
        options: &'a RemoveOptions,
    ) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.events.push(format!("remove:{}", id.as_str()));

            if state.fail_remove.contains(id.as_str()) {
                return Err(ContainerError::RemoveFailed {
                    id: id.as_str().to_string(),
                    reason: "injected remove failure".to_string(),
                });
            }

            let running = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| Self::not_found(id))?
                .state
                .is_running();
            if running && !options.force {
                return Err(ContainerError::RemoveFailed {
                    id: id.as_str().to_string(),
                    reason: "container is running".to_string(),
                });
            }

            state.containers.remove(id.as_str());
            Ok(())
        })
    }

    fn status<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ContainerStatus> {
        Box::pin(async move {
            let state = self.state.lock();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| Self::not_found(id))?;

            Ok(ContainerStatus {
                id: id.as_str().to_string(),
                image: container.image.clone(),
                state: container.state,
                exit_code: container.state.is_terminal().then_some(1),
                error: None,
            })
        })
    }

    fn list<'a>(&'a self, options: &'a ListOptions) -> RuntimeFuture<'a, Vec<ContainerSummary>> {
        Box::pin(async move {
            let state = self.state.lock();
            let label = options
                .label_filter
                .as_deref()
                .and_then(|l| l.split_once('='));

            Ok(state
                .containers
                .iter()
                .filter(|(_, c)| options.all || c.state.is_running())
                .filter(|(_, c)| {
                    options
                        .ancestor_filter
                        .as_ref()
                        .is_none_or(|image| &c.image == image)
                })
                .filter(|(_, c)| {
                    label.is_none_or(|(k, v)| c.labels.get(k).is_some_and(|lv| lv == v))
                })
                .map(|(id, c)| ContainerSummary {
                    id: id.clone(),
                    name: c.name.clone(),
                    image: c.image.clone(),
                    state: c.state,
                    status_message: c.state.name().to_string(),
                })
                .collect())
        })
    }

    fn logs<'a>(&'a self, id: &'a ContainerId, options: &'a LogsOptions) -> RuntimeFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let state = self.state.lock();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| Self::not_found(id))?;

            if !(options.stdout || options.stderr) {
                return Ok(Vec::new());
            }
            let mut out = String::new();
            for line in &container.logs {
                out.push_str(line);
                out.push('\n');
            }
            Ok(out.into_bytes())
        })
    }
}
