//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use nvcf_preflight::{
    CheckConfig, DEFAULT_HEALTH_ENDPOINT, DEFAULT_WAIT_SECONDS, InferenceTarget, Protocol,
};

use crate::error::CliError;

/// NVCF CLI - build and verify cloud function containers.
#[derive(Parser, Debug, Clone)]
#[command(name = "nvcf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[derive(Default)]
pub enum Format {
    /// Human-readable progress and summary.
    #[default]
    Table,
    /// JSON report for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Smoke-test a function container locally before deploying it.
    ///
    /// Launches the image, waits for it to report healthy, optionally sends
    /// one inference request, and always removes the container afterwards.
    Check(CheckArgs),
}

/// Protocol argument for the check command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[derive(Default)]
pub enum ProtocolArg {
    /// Plain HTTP health and inference endpoints.
    #[default]
    Http,
    /// gRPC health protocol and reflection.
    Grpc,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Http => Self::Http,
            ProtocolArg::Grpc => Self::Grpc,
        }
    }
}

/// Arguments for the check command.
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// Container image to test.
    #[arg(required = true)]
    pub image: String,

    /// Port the function listens on inside the container.
    #[arg(long, default_value_t = 8000)]
    pub container_port: u16,

    /// Protocol the function speaks.
    #[arg(long, value_enum, default_value_t = ProtocolArg::Http)]
    pub protocol: ProtocolArg,

    /// HTTP readiness path.
    #[arg(long, default_value = DEFAULT_HEALTH_ENDPOINT)]
    pub health_endpoint: String,

    /// How long to wait for the container to become healthy.
    #[arg(long, default_value_t = DEFAULT_WAIT_SECONDS)]
    pub seconds_to_wait_for_healthy: u64,

    /// Stop and remove existing containers from the same image first.
    #[arg(long)]
    pub force_cleanup: bool,

    /// Fully qualified gRPC service name (required with `--protocol grpc`).
    #[arg(long)]
    pub grpc_service_name: Option<String>,

    /// gRPC method name (required with `--protocol grpc`).
    #[arg(long)]
    pub grpc_method_name: Option<String>,

    /// gRPC request fields as a flat JSON object.
    #[arg(long, default_value = "{}")]
    pub grpc_input_data: String,

    /// HTTP inference path. Inference runs when this or a payload is given.
    #[arg(long)]
    pub http_inference_endpoint: Option<String>,

    /// HTTP inference payload as JSON.
    #[arg(long)]
    pub http_payload: Option<String>,

    /// Engine settings file (TOML).
    #[arg(long, env = "NVCF_PREFLIGHT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host port to publish the container port on.
    #[arg(long)]
    pub host_port: Option<u16>,
}

impl CheckArgs {
    /// Build the check configuration these arguments describe.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON flag does not parse or gRPC names are
    /// missing.
    pub fn to_config(&self) -> Result<CheckConfig, CliError> {
        let protocol = Protocol::from(self.protocol);
        let mut config = CheckConfig::new(&self.image, self.container_port)
            .with_protocol(protocol)
            .with_health_endpoint(&self.health_endpoint)
            .with_wait_seconds(self.seconds_to_wait_for_healthy)
            .with_force_cleanup(self.force_cleanup);

        let inference = match protocol {
            Protocol::Grpc => {
                let (Some(service), Some(method)) =
                    (&self.grpc_service_name, &self.grpc_method_name)
                else {
                    return Err(CliError::InvalidArgument(
                        "gRPC service name and method name are required for gRPC protocol".into(),
                    ));
                };
                Some(InferenceTarget::grpc(service, method, &self.grpc_input_data)?)
            }
            Protocol::Http => {
                if self.http_inference_endpoint.is_none() && self.http_payload.is_none() {
                    None
                } else {
                    let endpoint = self.http_inference_endpoint.as_deref().unwrap_or("/");
                    let payload = self.http_payload.as_deref().unwrap_or("{}");
                    Some(InferenceTarget::http(endpoint, payload)?)
                }
            }
        };
        if let Some(target) = inference {
            config = config.with_inference(target);
        }

        config.validate()?;
        Ok(config)
    }
}
