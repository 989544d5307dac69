//! The smoke test pipeline.
//!
//! Stages run in order: optional sweep, launch, readiness, optional
//! inference. Cleanup of the launched container happens in one place after
//! the stages finish, whether they succeeded, failed or were interrupted.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use nvcf_container::ContainerRuntime;
use tracing::{info, warn};

use crate::config::{CheckConfig, InferenceTarget, Protocol};
use crate::error::PreflightError;
use crate::grpc::GrpcInvoker;
use crate::http::HttpInferenceClient;
use crate::probe::{wait_healthy, GrpcHealthProbe, HttpHealthProbe, ProbeOutcome};
use crate::report::{CheckReport, HealthReport, InferenceReport};
use crate::session::SmokeTestSession;
use crate::settings::PreflightSettings;
use crate::signal::shutdown_signal;

/// Runs smoke tests against a container runtime.
pub struct SmokeTest {
    runtime: Arc<dyn ContainerRuntime>,
    settings: PreflightSettings,
}

impl SmokeTest {
    /// Smoke test over `runtime` with engine `settings`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: PreflightSettings) -> Self {
        Self { runtime, settings }
    }

    /// Engine settings in use.
    #[must_use]
    pub fn settings(&self) -> &PreflightSettings {
        &self.settings
    }

    /// Run the check, stopping early on SIGINT or SIGTERM.
    ///
    /// Progress lines go to `out`.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error, or
    /// [`PreflightError::Interrupted`].
    pub async fn run<W: Write>(
        &self,
        config: &CheckConfig,
        out: &mut W,
    ) -> Result<CheckReport, PreflightError> {
        self.run_until(config, out, shutdown_signal()).await
    }

    /// Run the check, stopping early when `shutdown` resolves to a signal
    /// name.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error, or
    /// [`PreflightError::Interrupted`].
    pub async fn run_until<W, F>(
        &self,
        config: &CheckConfig,
        out: &mut W,
        shutdown: F,
    ) -> Result<CheckReport, PreflightError>
    where
        W: Write,
        F: Future<Output = &'static str>,
    {
        config.validate()?;

        let session = SmokeTestSession::new(Arc::clone(&self.runtime), &self.settings);
        let outcome = tokio::select! {
            outcome = self.run_stages(&session, config, out) => outcome,
            signal = shutdown => Err(PreflightError::Interrupted { signal }),
        };

        if let Err(PreflightError::Interrupted { signal }) = &outcome {
            warn!(signal, "interrupted, cleaning up");
            writeln!(out, "\nReceived {signal}, cleaning up...")?;
        }

        match session.cleanup().await {
            Ok(removed) => {
                for id in removed {
                    info!(container = %id, "container cleaned up");
                    writeln!(out, "Container {id} removed")?;
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to clean up container");
                writeln!(out, "Warning: failed to clean up container: {err}")?;
            }
        }

        outcome
    }

    async fn run_stages<W: Write>(
        &self,
        session: &SmokeTestSession,
        config: &CheckConfig,
        out: &mut W,
    ) -> Result<CheckReport, PreflightError> {
        let sweep = if config.force_cleanup {
            writeln!(out, "Forcing cleanup of existing containers from {}...", config.image)?;
            let report = session
                .force_cleanup_by_image(&config.image)
                .await
                .map_err(PreflightError::ForceCleanup)?;
            for id in &report.removed {
                writeln!(out, "Stopping and removing container {id}... done")?;
            }
            for failure in &report.failures {
                writeln!(out, "Warning: {failure}")?;
            }
            writeln!(
                out,
                "Removed {} of {} existing containers",
                report.removed.len(),
                report.matched
            )?;
            Some(report)
        } else {
            None
        };

        writeln!(out, "Starting container from {}...", config.image)?;
        let launched = session
            .launch(&config.image, config.container_port)
            .await
            .map_err(PreflightError::Launch)?;
        writeln!(
            out,
            "Container {} started, port {} published on {}:{}",
            launched.id, config.container_port, self.settings.host_ip, launched.host_port
        )?;

        let base_url = self.settings.base_url(launched.host_port);
        let schedule = self.settings.poll_schedule(config.wait_budget());
        let (target, outcome) = match config.protocol {
            Protocol::Http => {
                let url = format!("{base_url}{}", config.health_endpoint);
                writeln!(out, "Looking for health signal at {url}")?;
                let mut probe =
                    HttpHealthProbe::new(url.clone(), self.settings.http_probe_timeout())?;
                (url, wait_healthy(&mut probe, schedule).await?)
            }
            Protocol::Grpc => {
                writeln!(out, "Looking for gRPC health signal at {base_url}")?;
                let mut probe = GrpcHealthProbe::new(
                    base_url.clone(),
                    self.settings.grpc_connect_timeout(),
                    self.settings.grpc_call_timeout(),
                )?;
                (base_url.clone(), wait_healthy(&mut probe, schedule).await?)
            }
        };
        writeln!(out, "Health Check succeeded!")?;

        let inference = match &config.inference {
            None => None,
            Some(InferenceTarget::Http { endpoint, payload }) => {
                let client = HttpInferenceClient::new(
                    base_url.clone(),
                    self.settings.http_connect_timeout(),
                    self.settings.http_read_timeout(),
                )?;
                let reply = client.invoke(out, endpoint, payload).await?;
                writeln!(out, "HTTP inference test succeeded!")?;
                Some(InferenceReport::Http(reply))
            }
            Some(InferenceTarget::Grpc {
                service,
                method,
                input,
            }) => {
                writeln!(out, "Connecting to gRPC server at {base_url}...")?;
                let invoker = GrpcInvoker::connect(
                    &base_url,
                    self.settings.grpc_connect_timeout(),
                    self.settings.grpc_call_timeout(),
                )
                .await?;
                writeln!(out, "Connected to gRPC server successfully")?;
                let invocation = invoker.exercise(out, service, method, input).await?;
                writeln!(out, "gRPC inference test succeeded!")?;
                Some(InferenceReport::Grpc(invocation))
            }
        };

        Ok(CheckReport {
            image: config.image.clone(),
            protocol: config.protocol,
            container_id: launched.id.short().to_string(),
            host_port: launched.host_port,
            sweep,
            health: health_report(target, outcome),
            inference,
        })
    }
}

fn health_report(target: String, outcome: ProbeOutcome) -> HealthReport {
    HealthReport {
        target,
        attempts: outcome.attempts,
        elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}
