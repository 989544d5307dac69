//! One container's lifetime within a smoke test.
//!
//! The session picks the container name before asking the engine to create
//! it and labels the container with that name. Cleanup removes the recorded
//! id, or finds the container by label when the create call was abandoned
//! before the id came back. A successful cleanup is final; a failed one can
//! be retried.

use std::sync::Arc;
use std::time::Duration;

use nvcf_container::{
    ContainerConfig, ContainerError, ContainerId, ContainerResult, ContainerRuntime, ListOptions,
    LogsOptions, PortMapping, RemoveOptions, StopOptions,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::settings::PreflightSettings;

/// Label applied to every container the session creates.
pub const MANAGED_BY_LABEL: &str = "nvcf.preflight.managed-by";

/// Label carrying the name of the session's container.
pub const SESSION_LABEL: &str = "nvcf.preflight.session";

/// A container that started and stayed up through the settle delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedContainer {
    /// Engine-assigned id.
    pub id: ContainerId,
    /// Host port the container port is published on.
    pub host_port: u16,
}

/// What a force sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Containers matching the image.
    pub matched: usize,
    /// Short ids removed.
    pub removed: Vec<String>,
    /// Per-container failures, logged and skipped.
    pub failures: Vec<String>,
}

/// Owns at most one container for the duration of a check.
pub struct SmokeTestSession {
    runtime: Arc<dyn ContainerRuntime>,
    host_ip: String,
    host_port: u16,
    settle_delay: Duration,
    name: Mutex<Option<String>>,
    container: Mutex<Option<ContainerId>>,
    cleaned: OnceCell<Vec<ContainerId>>,
}

impl std::fmt::Debug for SmokeTestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmokeTestSession")
            .field("host_ip", &self.host_ip)
            .field("host_port", &self.host_port)
            .field("name", &*self.name.lock())
            .field("container", &*self.container.lock())
            .field("cleaned", &self.cleaned.initialized())
            .finish_non_exhaustive()
    }
}

impl SmokeTestSession {
    /// New session over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: &PreflightSettings) -> Self {
        Self {
            runtime,
            host_ip: settings.host_ip.clone(),
            host_port: settings.default_host_port,
            settle_delay: settings.settle_delay(),
            name: Mutex::new(None),
            container: Mutex::new(None),
            cleaned: OnceCell::new(),
        }
    }

    /// Id of the owned container, if one was created and not yet removed.
    #[must_use]
    pub fn container_id(&self) -> Option<ContainerId> {
        self.container.lock().clone()
    }

    /// Whether cleanup has completed successfully.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned.initialized()
    }

    /// Create and start a container from `image`, publishing
    /// `container_port` on the session's host port.
    ///
    /// A missing image is pulled and creation retried once. After the
    /// settle delay the container must still be running; otherwise its logs
    /// are returned in [`ContainerError::ExitedOnStart`].
    ///
    /// # Errors
    ///
    /// Returns the engine error of the failing step. Whatever was created
    /// stays reachable by [`Self::cleanup`], even if this future is dropped
    /// mid-create.
    pub async fn launch(
        &self,
        image: &str,
        container_port: u16,
    ) -> ContainerResult<LaunchedContainer> {
        if self.is_cleaned_up() {
            return Err(ContainerError::InvalidConfig(
                "session has already been cleaned up".to_string(),
            ));
        }
        let name = {
            let mut slot = self.name.lock();
            if slot.is_some() {
                return Err(ContainerError::InvalidConfig(
                    "session already owns a container".to_string(),
                ));
            }
            slot.insert(format!("nvcf-preflight-{}", Uuid::new_v4().simple()))
                .clone()
        };

        let config = ContainerConfig::new(&name, image)
            .with_port(PortMapping::new(container_port, self.host_port, &self.host_ip))
            .with_label(MANAGED_BY_LABEL, "nvcf-cli")
            .with_label(SESSION_LABEL, &name);

        let id = match self.runtime.create(&config).await {
            Err(ContainerError::ImageNotFound { .. }) => {
                info!(image, "image not found locally, pulling");
                self.runtime.pull(image).await?;
                self.runtime.create(&config).await?
            }
            other => other?,
        };
        *self.container.lock() = Some(id.clone());
        info!(container = %id, name = %config.name, "container created");

        self.runtime.start(&id).await?;
        info!(
            container = %id,
            host_port = self.host_port,
            container_port,
            "container started"
        );

        tokio::time::sleep(self.settle_delay).await;

        let status = self.runtime.status(&id).await?;
        if !status.state.is_running() {
            warn!(container = %id, state = %status.state, "container exited after start");
            let logs = self.runtime.logs(&id, &LogsOptions::all()).await?;
            return Err(ContainerError::ExitedOnStart {
                id: id.as_str().to_string(),
                logs: String::from_utf8_lossy(&logs).into_owned(),
            });
        }

        Ok(LaunchedContainer {
            id,
            host_port: self.host_port,
        })
    }

    /// Force-remove the session's container and return the ids removed.
    ///
    /// A container already gone counts as removed. Once a call succeeds,
    /// later calls return the same ids without touching the engine; after a
    /// failure the container stays recorded and the next call retries.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the container could not be found or
    /// removed.
    pub async fn cleanup(&self) -> ContainerResult<Vec<ContainerId>> {
        self.cleaned
            .get_or_try_init(|| self.remove_owned())
            .await
            .cloned()
    }

    async fn remove_owned(&self) -> ContainerResult<Vec<ContainerId>> {
        let recorded = self.container.lock().clone();
        let targets = match recorded {
            Some(id) => vec![id],
            None => self.find_by_name().await?,
        };

        for id in &targets {
            info!(container = %id, "removing container");
            match self.runtime.remove(id, &RemoveOptions::force()).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    info!(container = %id, "container already removed");
                }
                Err(err) => return Err(err),
            }
        }

        self.container.lock().take();
        Ok(targets)
    }

    /// Containers carrying this session's name label. Covers a create that
    /// completed on the engine after the caller stopped waiting for it.
    async fn find_by_name(&self) -> ContainerResult<Vec<ContainerId>> {
        let Some(name) = self.name.lock().clone() else {
            return Ok(Vec::new());
        };

        let found = self
            .runtime
            .list(&ListOptions::all().with_label(SESSION_LABEL, &name))
            .await?;
        if !found.is_empty() {
            warn!(name = %name, count = found.len(), "found container with no recorded id");
        }
        Ok(found
            .into_iter()
            .filter_map(|summary| ContainerId::new(summary.id).ok())
            .collect())
    }

    /// Stop and remove every container created from `image`.
    ///
    /// Per-container failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the containers cannot be listed.
    pub async fn force_cleanup_by_image(&self, image: &str) -> ContainerResult<SweepReport> {
        let containers = self
            .runtime
            .list(&ListOptions::all().with_ancestor(image))
            .await?;

        let mut report = SweepReport {
            matched: containers.len(),
            ..SweepReport::default()
        };
        info!(image, matched = report.matched, "sweeping containers");

        for summary in containers {
            let id = match ContainerId::new(summary.id) {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "skipping container with invalid id");
                    report.failures.push(err.to_string());
                    continue;
                }
            };

            info!(container = %id, state = %summary.state, "stopping and removing container");
            if let Err(err) = self.runtime.stop(&id, &StopOptions::default()).await {
                warn!(container = %id, error = %err, "failed to stop container");
                report.failures.push(err.to_string());
            }
            match self.runtime.remove(&id, &RemoveOptions::force()).await {
                Ok(()) => report.removed.push(id.short().to_string()),
                Err(err) => {
                    warn!(container = %id, error = %err, "failed to remove container");
                    report.failures.push(err.to_string());
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nvcf_container::{
        ContainerState, ContainerStatus, ContainerSummary, FakeRuntime, RuntimeFuture,
    };

    /// Fake engine whose create call keeps running after the container
    /// exists, like a daemon that is slow to answer.
    pub(crate) struct SlowCreateRuntime {
        inner: Arc<FakeRuntime>,
        delay: Duration,
    }

    impl SlowCreateRuntime {
        pub(crate) fn new(inner: Arc<FakeRuntime>, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    impl ContainerRuntime for SlowCreateRuntime {
        fn ping(&self) -> RuntimeFuture<'_, ()> {
            self.inner.ping()
        }

        fn pull<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, ()> {
            self.inner.pull(image)
        }

        fn create<'a>(&'a self, config: &'a ContainerConfig) -> RuntimeFuture<'a, ContainerId> {
            Box::pin(async move {
                let id = self.inner.create(config).await?;
                tokio::time::sleep(self.delay).await;
                Ok(id)
            })
        }

        fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
            self.inner.start(id)
        }

        fn stop<'a>(
            &'a self,
            id: &'a ContainerId,
            options: &'a StopOptions,
        ) -> RuntimeFuture<'a, ()> {
            self.inner.stop(id, options)
        }

        fn remove<'a>(
            &'a self,
            id: &'a ContainerId,
            options: &'a RemoveOptions,
        ) -> RuntimeFuture<'a, ()> {
            self.inner.remove(id, options)
        }

        fn status<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ContainerStatus> {
            self.inner.status(id)
        }

        fn list<'a>(
            &'a self,
            options: &'a ListOptions,
        ) -> RuntimeFuture<'a, Vec<ContainerSummary>> {
            self.inner.list(options)
        }

        fn logs<'a>(
            &'a self,
            id: &'a ContainerId,
            options: &'a LogsOptions,
        ) -> RuntimeFuture<'a, Vec<u8>> {
            self.inner.logs(id, options)
        }
    }

    fn settings() -> PreflightSettings {
        PreflightSettings {
            settle_delay_ms: 0,
            ..PreflightSettings::default()
        }
    }

    fn session(runtime: &Arc<FakeRuntime>) -> SmokeTestSession {
        SmokeTestSession::new(runtime.clone(), &settings())
    }

    #[tokio::test]
    async fn test_launch_and_cleanup() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);

        let launched = session.launch("echo:http", 8000).await.expect("launch");
        assert_eq!(launched.host_port, 18080);
        assert_eq!(session.container_id(), Some(launched.id.clone()));
        assert_eq!(runtime.state_of(&launched.id), Some(ContainerState::Running));

        session.cleanup().await.expect("cleanup");
        assert_eq!(runtime.container_count(), 0);
        assert!(session.container_id().is_none());
    }

    fn remove_events(runtime: &FakeRuntime) -> usize {
        runtime
            .events()
            .iter()
            .filter(|e| e.starts_with("remove:"))
            .count()
    }

    #[tokio::test]
    async fn test_failed_cleanup_is_retried_until_removed() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);
        let launched = session.launch("echo:http", 8000).await.expect("launch");
        runtime.fail_remove(&launched.id);

        assert!(session.cleanup().await.is_err());
        assert!(!session.is_cleaned_up());
        assert_eq!(session.container_id(), Some(launched.id.clone()));
        assert_eq!(runtime.container_count(), 1);

        runtime.clear_failures(&launched.id);
        let removed = session.cleanup().await.expect("retry");
        assert_eq!(removed, vec![launched.id.clone()]);
        assert!(session.is_cleaned_up());
        assert!(session.container_id().is_none());

        let leftover = runtime
            .list(&ListOptions::all().with_ancestor("echo:http"))
            .await
            .expect("list");
        assert!(leftover.is_empty());

        let again = session.cleanup().await.expect("no-op");
        assert_eq!(again, vec![launched.id]);
        assert_eq!(remove_events(&runtime), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_finds_container_when_create_was_abandoned() {
        let fake = Arc::new(FakeRuntime::new());
        let slow = Arc::new(SlowCreateRuntime::new(
            fake.clone(),
            Duration::from_millis(200),
        ));
        let session = SmokeTestSession::new(slow, &settings());

        let launch = session.launch("echo:http", 8000);
        assert!(tokio::time::timeout(Duration::from_millis(50), launch)
            .await
            .is_err());
        assert_eq!(fake.container_count(), 1);
        assert!(session.container_id().is_none());

        let removed = session.cleanup().await.expect("cleanup");
        assert_eq!(removed.len(), 1);
        assert_eq!(fake.container_count(), 0);
    }

    #[tokio::test]
    async fn test_label_lookup_ignores_other_containers() {
        let runtime = Arc::new(FakeRuntime::new());
        let bystander = runtime.seed("echo:http", ContainerState::Running);
        let session = session(&runtime);
        let launched = session.launch("echo:http", 8000).await.expect("launch");

        *session.container.lock() = None;
        let removed = session.cleanup().await.expect("cleanup");

        assert_eq!(removed, vec![launched.id.clone()]);
        assert!(runtime.state_of(&launched.id).is_none());
        assert!(runtime.state_of(&bystander).is_some());
    }

    #[tokio::test]
    async fn test_cleanup_without_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);
        let removed = session.cleanup().await.expect("nothing to clean");
        assert!(removed.is_empty());
        assert!(session.is_cleaned_up());
        assert!(runtime.events().is_empty());
    }

    #[tokio::test]
    async fn test_launch_refused_after_cleanup() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);
        session.cleanup().await.expect("cleanup");

        let err = session.launch("echo:http", 8000).await.expect_err("refused");
        assert!(matches!(err, ContainerError::InvalidConfig(_)));
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_launch_pulls_missing_image() {
        let runtime = Arc::new(FakeRuntime::new().with_local_images(Vec::<String>::new()));
        let session = session(&runtime);

        session.launch("echo:http", 8000).await.expect("launch");
        let events = runtime.events();
        assert_eq!(events[0], "create:echo:http");
        assert_eq!(events[1], "pull:echo:http");
        assert_eq!(events[2], "create:echo:http");
    }

    #[tokio::test]
    async fn test_exit_on_start_returns_logs_and_keeps_id() {
        let runtime = Arc::new(
            FakeRuntime::new().exit_on_start("crash:1", vec!["fatal: model not found".to_string()]),
        );
        let session = session(&runtime);

        let err = session.launch("crash:1", 8000).await.expect_err("exited");
        let ContainerError::ExitedOnStart { logs, .. } = &err else {
            panic!("expected ExitedOnStart, got {err:?}");
        };
        assert!(logs.contains("fatal: model not found"));
        assert!(err.to_string().contains("fatal: model not found"));

        assert!(session.container_id().is_some());
        session.cleanup().await.expect("cleanup");
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_container() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);
        let launched = session.launch("echo:http", 8000).await.expect("launch");

        runtime
            .remove(&launched.id, &RemoveOptions::force())
            .await
            .expect("external removal");
        session.cleanup().await.expect("already gone is fine");
    }

    #[tokio::test]
    async fn test_force_sweep_skips_failures() {
        let runtime = Arc::new(FakeRuntime::new());
        let first = runtime.seed("echo:http", ContainerState::Running);
        let second = runtime.seed("echo:http", ContainerState::Exited);
        let third = runtime.seed("echo:http", ContainerState::Running);
        let other = runtime.seed("other:1", ContainerState::Running);
        runtime.fail_stop(&first);
        runtime.fail_remove(&second);

        let session = session(&runtime);
        let report = session
            .force_cleanup_by_image("echo:http")
            .await
            .expect("sweep");

        assert_eq!(report.matched, 3);
        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert!(runtime.state_of(&first).is_none());
        assert!(runtime.state_of(&second).is_some());
        assert!(runtime.state_of(&third).is_none());
        assert!(runtime.state_of(&other).is_some());
    }

    #[tokio::test]
    async fn test_force_sweep_with_no_matches_is_empty() {
        let runtime = Arc::new(FakeRuntime::new());
        let other = runtime.seed("other:1", ContainerState::Running);
        let session = session(&runtime);

        let report = session
            .force_cleanup_by_image("echo:http")
            .await
            .expect("sweep");

        assert_eq!(report, SweepReport::default());
        assert!(runtime.state_of(&other).is_some());
        assert_eq!(remove_events(&runtime), 0);
    }

    #[tokio::test]
    async fn test_second_launch_rejected() {
        let runtime = Arc::new(FakeRuntime::new());
        let session = session(&runtime);
        session.launch("echo:http", 8000).await.expect("launch");
        assert!(session.launch("echo:http", 8000).await.is_err());
        assert_eq!(runtime.container_count(), 1);
    }
}
