//! Per-invocation check configuration.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PreflightError;

/// Default container health endpoint.
pub const DEFAULT_HEALTH_ENDPOINT: &str = "/v2/health/ready";

/// Default readiness wait budget in seconds.
pub const DEFAULT_WAIT_SECONDS: u64 = 600;

/// Protocol the function container speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    #[default]
    Http,
    /// gRPC over HTTP/2.
    Grpc,
}

impl Protocol {
    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The inference call made after the container is healthy.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceTarget {
    /// POST a JSON payload to a path.
    Http {
        /// Request path, e.g. `/v1/infer`.
        endpoint: String,
        /// JSON body.
        payload: Value,
    },
    /// Unary RPC discovered through server reflection.
    Grpc {
        /// Fully-qualified or short service name.
        service: String,
        /// Method name.
        method: String,
        /// Flat field-name to value map for the request message.
        input: Map<String, Value>,
    },
}

impl InferenceTarget {
    /// HTTP target from a path and a JSON text payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON.
    pub fn http(endpoint: impl Into<String>, payload: &str) -> Result<Self, PreflightError> {
        let payload = serde_json::from_str(payload)
            .map_err(|e| PreflightError::Config(format!("invalid HTTP payload JSON: {e}")))?;
        Ok(Self::Http {
            endpoint: endpoint.into(),
            payload,
        })
    }

    /// gRPC target from names and a JSON object text.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a JSON object.
    pub fn grpc(
        service: impl Into<String>,
        method: impl Into<String>,
        input: &str,
    ) -> Result<Self, PreflightError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| PreflightError::Config(format!("invalid gRPC input JSON: {e}")))?;
        let Value::Object(input) = value else {
            return Err(PreflightError::Config(
                "gRPC input data must be a JSON object".to_string(),
            ));
        };
        Ok(Self::Grpc {
            service: service.into(),
            method: method.into(),
            input,
        })
    }

    /// Protocol this target is exercised over.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Http { .. } => Protocol::Http,
            Self::Grpc { .. } => Protocol::Grpc,
        }
    }
}

/// Everything one smoke-test run needs to know about the function.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    /// Image to launch.
    pub image: String,
    /// Port the function listens on inside the container.
    pub container_port: u16,
    /// Protocol spoken on that port.
    pub protocol: Protocol,
    /// HTTP health path; ignored for gRPC.
    pub health_endpoint: String,
    /// Total readiness budget.
    pub seconds_to_wait_for_healthy: u64,
    /// Remove leftover containers of the same image before launching.
    pub force_cleanup: bool,
    /// Inference call to make once healthy.
    pub inference: Option<InferenceTarget>,
}

impl CheckConfig {
    /// HTTP check with default endpoint and budget and no inference call.
    #[must_use]
    pub fn new(image: impl Into<String>, container_port: u16) -> Self {
        Self {
            image: image.into(),
            container_port,
            protocol: Protocol::Http,
            health_endpoint: DEFAULT_HEALTH_ENDPOINT.to_string(),
            seconds_to_wait_for_healthy: DEFAULT_WAIT_SECONDS,
            force_cleanup: false,
            inference: None,
        }
    }

    /// Set the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the HTTP health path.
    #[must_use]
    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = endpoint.into();
        self
    }

    /// Set the readiness budget.
    #[must_use]
    pub fn with_wait_seconds(mut self, seconds: u64) -> Self {
        self.seconds_to_wait_for_healthy = seconds;
        self
    }

    /// Enable the pre-launch sweep.
    #[must_use]
    pub fn with_force_cleanup(mut self, force: bool) -> Self {
        self.force_cleanup = force;
        self
    }

    /// Set the inference call.
    #[must_use]
    pub fn with_inference(mut self, target: InferenceTarget) -> Self {
        self.inference = Some(target);
        self
    }

    /// Readiness budget as a duration.
    #[must_use]
    pub const fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.seconds_to_wait_for_healthy)
    }

    /// Check that the configuration can be run.
    ///
    /// # Errors
    ///
    /// Returns [`PreflightError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<(), PreflightError> {
        if self.image.trim().is_empty() {
            return Err(PreflightError::Config("image is required".to_string()));
        }
        if self.container_port == 0 {
            return Err(PreflightError::Config(
                "container port must be non-zero".to_string(),
            ));
        }
        if self.seconds_to_wait_for_healthy == 0 {
            return Err(PreflightError::Config(
                "seconds to wait for healthy must be at least 1".to_string(),
            ));
        }

        match (self.protocol, &self.inference) {
            (Protocol::Http, _) if !self.health_endpoint.starts_with('/') => {
                Err(PreflightError::Config(format!(
                    "health endpoint must start with '/': {}",
                    self.health_endpoint
                )))
            }
            (Protocol::Grpc, Some(InferenceTarget::Grpc { service, method, .. }))
                if !service.trim().is_empty() && !method.trim().is_empty() =>
            {
                Ok(())
            }
            (Protocol::Grpc, _) => Err(PreflightError::Config(
                "gRPC service name and method name are required for gRPC protocol".to_string(),
            )),
            (Protocol::Http, Some(InferenceTarget::Grpc { .. })) => Err(PreflightError::Config(
                "gRPC inference requires the gRPC protocol".to_string(),
            )),
            (Protocol::Http, Some(InferenceTarget::Http { endpoint, .. }))
                if !endpoint.starts_with('/') =>
            {
                Err(PreflightError::Config(format!(
                    "HTTP inference endpoint must start with '/': {endpoint}"
                )))
            }
            (Protocol::Http, _) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = CheckConfig::new("echo:http", 8000);
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.health_endpoint, "/v2/health/ready");
        assert_eq!(config.wait_budget(), Duration::from_secs(600));
        assert!(config.inference.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grpc_requires_service_and_method() {
        let config = CheckConfig::new("echo:grpc", 8001).with_protocol(Protocol::Grpc);
        let err = config.validate().expect_err("missing service");
        assert!(err
            .to_string()
            .contains("gRPC service name and method name are required"));

        let config = config.with_inference(
            InferenceTarget::grpc("", "Say", "{}").expect("valid input"),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grpc_with_target_is_valid() {
        let config = CheckConfig::new("echo:grpc", 8001)
            .with_protocol(Protocol::Grpc)
            .with_inference(
                InferenceTarget::grpc("echo.Echo", "Say", r#"{"name":"x"}"#).expect("input"),
            );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_rejects_grpc_target() {
        let config = CheckConfig::new("echo:http", 8000)
            .with_inference(InferenceTarget::grpc("echo.Echo", "Say", "{}").expect("input"));
        assert!(config.validate().is_err());
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    fn test_image_required(image: &str) {
        assert!(CheckConfig::new(image, 8000).validate().is_err());
    }

    #[test]
    fn test_zero_port_and_budget_rejected() {
        assert!(CheckConfig::new("echo:http", 0).validate().is_err());
        assert!(CheckConfig::new("echo:http", 8000)
            .with_wait_seconds(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_health_endpoint_must_be_path() {
        let config = CheckConfig::new("echo:http", 8000).with_health_endpoint("health");
        assert!(config.validate().is_err());
    }

    #[test_case("{not json" ; "malformed")]
    #[test_case("[1, 2]" ; "array")]
    #[test_case("\"text\"" ; "string")]
    fn test_grpc_input_must_be_object(input: &str) {
        assert!(InferenceTarget::grpc("echo.Echo", "Say", input).is_err());
    }

    #[test]
    fn test_http_payload_parsed() {
        let target = InferenceTarget::http("/infer", r#"{"x": 1}"#).expect("valid");
        assert_eq!(target.protocol(), Protocol::Http);
        let InferenceTarget::Http { payload, .. } = target else {
            panic!("expected HTTP target");
        };
        assert_eq!(payload["x"], 1);

        assert!(InferenceTarget::http("/infer", "{").is_err());
    }
}
