//! Pre-flight engine settings.
//!
//! Tunables that are not part of a single check invocation: ports, attempt
//! counts and the various timeouts. Loaded from TOML; every key is optional.
//!
//! ```toml
//! default_host_port = 18080
//! wait_iterations = 100
//! min_poll_interval_ms = 100
//! settle_delay_ms = 2000
//! http_probe_timeout_secs = 5
//! http_read_timeout_secs = 300
//! grpc_connect_timeout_secs = 10
//! grpc_call_timeout_secs = 10
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::PollSchedule;

/// Errors loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file '{}': {source}", path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("invalid settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Engine-wide settings for the smoke test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PreflightSettings {
    /// Host port the container port is published on.
    pub default_host_port: u16,
    /// Host interface the port is bound to.
    pub host_ip: String,
    /// Number of readiness attempts spread across the wait budget.
    pub wait_iterations: u32,
    /// Floor for the per-attempt sleep.
    pub min_poll_interval_ms: u64,
    /// Delay between container start and the crash-on-start inspection.
    pub settle_delay_ms: u64,
    /// Per-request timeout for HTTP health probes.
    pub http_probe_timeout_secs: u64,
    /// Connect timeout for the HTTP inference request.
    pub http_connect_timeout_secs: u64,
    /// Time allowed for the response headers and, unless the reply is an
    /// event stream, its whole body.
    pub http_read_timeout_secs: u64,
    /// Dial timeout for gRPC connections.
    pub grpc_connect_timeout_secs: u64,
    /// Timeout for reflection and the inference RPC.
    pub grpc_call_timeout_secs: u64,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            default_host_port: 18080,
            host_ip: "127.0.0.1".to_string(),
            wait_iterations: 100,
            min_poll_interval_ms: 100,
            settle_delay_ms: 2000,
            http_probe_timeout_secs: 5,
            http_connect_timeout_secs: 10,
            http_read_timeout_secs: 300,
            grpc_connect_timeout_secs: 10,
            grpc_call_timeout_secs: 10,
        }
    }
}

impl PreflightSettings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_host_port == 0 {
            return Err(SettingsError::Invalid(
                "default_host_port must be non-zero".to_string(),
            ));
        }
        if self.host_ip.parse::<IpAddr>().is_err() {
            return Err(SettingsError::Invalid(format!(
                "host_ip is not an IP address: {}",
                self.host_ip
            )));
        }
        if self.wait_iterations == 0 {
            return Err(SettingsError::Invalid(
                "wait_iterations must be at least 1".to_string(),
            ));
        }
        if self.min_poll_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "min_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("http_probe_timeout_secs", self.http_probe_timeout_secs),
            ("http_connect_timeout_secs", self.http_connect_timeout_secs),
            ("http_read_timeout_secs", self.http_read_timeout_secs),
            ("grpc_connect_timeout_secs", self.grpc_connect_timeout_secs),
            ("grpc_call_timeout_secs", self.grpc_call_timeout_secs),
        ] {
            if value == 0 {
                return Err(SettingsError::Invalid(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// Base URL for reaching a port published on the host interface.
    ///
    /// An unspecified bind address is reached through loopback.
    #[must_use]
    pub fn base_url(&self, port: u16) -> String {
        match self.host_ip.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() && ip.is_ipv4() => format!("http://127.0.0.1:{port}"),
            Ok(ip) if ip.is_unspecified() => format!("http://[::1]:{port}"),
            Ok(IpAddr::V6(ip)) => format!("http://[{ip}]:{port}"),
            _ => format!("http://{}:{port}", self.host_ip),
        }
    }

    /// Readiness schedule for a total wait budget.
    #[must_use]
    pub fn poll_schedule(&self, budget: Duration) -> PollSchedule {
        PollSchedule::spread(budget, self.wait_iterations, self.min_poll_interval())
    }

    /// Floor for the per-attempt sleep.
    #[must_use]
    pub const fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }

    /// Delay before checking that a started container is still running.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Per-request timeout for HTTP health probes.
    #[must_use]
    pub const fn http_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.http_probe_timeout_secs)
    }

    /// Connect timeout for the HTTP inference request.
    #[must_use]
    pub const fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }

    /// Read timeout for a non-streaming HTTP inference reply.
    #[must_use]
    pub const fn http_read_timeout(&self) -> Duration {
        Duration::from_secs(self.http_read_timeout_secs)
    }

    /// Dial timeout for gRPC connections.
    #[must_use]
    pub const fn grpc_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.grpc_connect_timeout_secs)
    }

    /// Timeout for reflection and the inference RPC.
    #[must_use]
    pub const fn grpc_call_timeout(&self) -> Duration {
        Duration::from_secs(self.grpc_call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let settings = PreflightSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.default_host_port, 18080);
        assert_eq!(settings.wait_iterations, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = PreflightSettings::from_toml(
            r#"
            default_host_port = 19090
            settle_delay_ms = 0
            "#,
        )
        .expect("valid settings");

        assert_eq!(settings.default_host_port, 19090);
        assert_eq!(settings.settle_delay(), Duration::ZERO);
        assert_eq!(settings.http_probe_timeout(), Duration::from_secs(5));
        assert_eq!(settings.http_read_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_read_timeout_rejected() {
        let result = PreflightSettings::from_toml("http_read_timeout_secs = 0");
        let Err(SettingsError::Invalid(message)) = result else {
            panic!("expected invalid settings, got {result:?}");
        };
        assert!(message.contains("http_read_timeout_secs"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = PreflightSettings::from_toml("wait_iteration = 5");
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let result = PreflightSettings::from_toml("wait_iterations = 0");
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_bad_host_ip_rejected() {
        let result = PreflightSettings::from_toml(r#"host_ip = "localhost""#);
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "grpc_call_timeout_secs = 30").expect("write");

        let settings = PreflightSettings::from_file(file.path()).expect("load");
        assert_eq!(settings.grpc_call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file() {
        let result = PreflightSettings::from_file("/nonexistent/nvcf/preflight.toml");
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }

    #[test_case("127.0.0.1", "http://127.0.0.1:18080" ; "loopback")]
    #[test_case("0.0.0.0", "http://127.0.0.1:18080" ; "unspecified v4")]
    #[test_case("::", "http://[::1]:18080" ; "unspecified v6")]
    #[test_case("::1", "http://[::1]:18080" ; "loopback v6")]
    fn test_base_url(host_ip: &str, expected: &str) {
        let settings = PreflightSettings {
            host_ip: host_ip.to_string(),
            ..PreflightSettings::default()
        };
        assert_eq!(settings.base_url(18080), expected);
    }

    #[test]
    fn test_poll_schedule_uses_iterations() {
        let settings = PreflightSettings::default();
        let schedule = settings.poll_schedule(Duration::from_secs(600));
        assert_eq!(schedule.attempts, 100);
        assert_eq!(schedule.interval, Duration::from_secs(6));
    }
}
