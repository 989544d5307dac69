//! Pre-flight check command implementation.
//!
//! Launches the image locally, waits for readiness and exercises one
//! inference call.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use nvcf_container::ContainerRuntime;
use nvcf_preflight::{CheckConfig, PreflightSettings, SmokeTest, shutdown_signal};
use tracing::{debug, info};

use crate::cli::CheckArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Check command executor.
#[derive(Debug)]
pub struct CheckCommand {
    config: CheckConfig,
    settings: PreflightSettings,
}

impl CheckCommand {
    /// Validate `args` and load engine settings.
    ///
    /// Nothing here talks to the container engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments or the settings are invalid.
    pub fn new(args: &CheckArgs) -> Result<Self, CliError> {
        let config = args.to_config()?;
        let settings = load_settings(args)?;
        debug!(?settings, "loaded engine settings");
        Ok(Self { config, settings })
    }

    /// Validated check configuration.
    #[must_use]
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Execute the check on `runtime`, stopping early on SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable or any stage fails.
    pub async fn execute<W: Write>(
        &self,
        runtime: Arc<dyn ContainerRuntime>,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        self.execute_until(runtime, writer, format, shutdown_signal())
            .await
    }

    /// Execute the check on `runtime`, stopping early when `shutdown`
    /// resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable or any stage fails.
    pub async fn execute_until<W, F>(
        &self,
        runtime: Arc<dyn ContainerRuntime>,
        writer: &mut W,
        format: &OutputFormat,
        shutdown: F,
    ) -> Result<(), CliError>
    where
        W: Write,
        F: Future<Output = &'static str>,
    {
        runtime.ping().await?;
        info!(
            image = %self.config.image,
            protocol = %self.config.protocol,
            "starting pre-flight check"
        );

        let smoke_test = SmokeTest::new(runtime, self.settings.clone());
        let report = if format.is_json() {
            smoke_test
                .run_until(&self.config, &mut io::sink(), shutdown)
                .await?
        } else {
            smoke_test.run_until(&self.config, writer, shutdown).await?
        };

        format.write(writer, &report)?;
        Ok(())
    }
}

/// Engine settings from `--config` (or the default), with `--host-port`
/// applied.
///
/// # Errors
///
/// Returns an error if the settings file cannot be loaded or the result is
/// invalid.
pub fn load_settings(args: &CheckArgs) -> Result<PreflightSettings, CliError> {
    let mut settings = match &args.config {
        Some(path) => {
            debug!(path = %path.display(), "reading engine settings");
            PreflightSettings::from_file(path)?
        }
        None => PreflightSettings::default(),
    };
    if let Some(port) = args.host_port {
        settings.default_host_port = port;
    }
    settings.validate()?;
    Ok(settings)
}
