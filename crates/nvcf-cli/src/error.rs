//! CLI error types.

use std::fmt;
use std::process::ExitCode;

use nvcf_container::ContainerError;
use nvcf_preflight::{PreflightError, SettingsError};

/// Exit status used when a check is interrupted by a signal.
pub const EXIT_INTERRUPTED: u8 = 130;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// The container engine could not be reached.
    Engine(ContainerError),
    /// Engine settings could not be loaded.
    Settings(SettingsError),
    /// The check itself failed.
    Preflight(PreflightError),
    /// Output formatting error.
    Format(String),
    /// Invalid argument.
    InvalidArgument(String),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Whether the check was stopped by SIGINT or SIGTERM.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Preflight(err) if err.is_interrupted())
    }

    /// Numeric exit status for this error.
    #[must_use]
    pub fn exit_status(&self) -> u8 {
        if self.is_interrupted() { EXIT_INTERRUPTED } else { 1 }
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "container engine error: {e}"),
            Self::Settings(e) => write!(f, "settings error: {e}"),
            Self::Preflight(e) => write!(f, "{e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::Preflight(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Format(_) | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<PreflightError> for CliError {
    fn from(err: PreflightError) -> Self {
        Self::Preflight(err)
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Settings(err)
    }
}

impl From<ContainerError> for CliError {
    fn from(err: ContainerError) -> Self {
        Self::Engine(err)
    }
}
