//! NVCF CLI binary entrypoint.
//!
//! This is the main entry point for the `nvcf` command-line tool.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nvcf_cli::cli::{Cli, Commands};
use nvcf_cli::commands::CheckCommand;
use nvcf_cli::output::OutputFormat;
use nvcf_container::DockerRuntime;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG overrides -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), nvcf_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Check(args) => {
            let cmd = CheckCommand::new(&args)?;
            let engine = Arc::new(DockerRuntime::connect()?);
            cmd.execute(engine, &mut stdout, &format).await?;
        }
    }

    Ok(())
}

fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}
