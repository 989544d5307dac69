//! Reflection-driven unary calls.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use super::codec::DynamicCodec;
use super::error::GrpcError;
use super::message::DynamicMessage;
use super::reflection::ReflectionClient;
use super::schema::{resolve_service_name, ServiceSchema};

/// Result of service discovery.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Every service the server advertises.
    pub available: Vec<String>,
    /// The resolved method.
    pub schema: ServiceSchema,
}

/// Outcome of one successful inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrpcInvocation {
    /// `/service/method` path that was called.
    pub method: String,
    /// Request fields sent.
    pub request: Map<String, Value>,
    /// Response fields received.
    pub response: Map<String, Value>,
    /// Response fields present on the wire but not representable.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

/// Calls a unary method on a server that exposes reflection.
///
/// One channel is shared by reflection and the call itself.
#[derive(Debug, Clone)]
pub struct GrpcInvoker {
    channel: Channel,
    target: String,
    call_timeout: Duration,
}

impl GrpcInvoker {
    /// Dial `target` (e.g. `http://127.0.0.1:18080`) and wait for the
    /// connection to be established.
    ///
    /// # Errors
    ///
    /// Returns [`GrpcError::InvalidTarget`] or [`GrpcError::Connect`].
    pub async fn connect(
        target: &str,
        connect_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, GrpcError> {
        let endpoint = Endpoint::from_shared(target.to_string())
            .map_err(|e| GrpcError::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(connect_timeout);

        let channel = tokio::time::timeout(connect_timeout, endpoint.connect())
            .await
            .map_err(|_| GrpcError::Connect {
                target: target.to_string(),
                reason: format!("timed out after {}s", connect_timeout.as_secs()),
            })?
            .map_err(|e| GrpcError::Connect {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        info!(address = target, "connected to gRPC server");
        Ok(Self {
            channel,
            target: target.to_string(),
            call_timeout,
        })
    }

    /// Address this invoker is connected to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// List services and resolve `method` on `service` through reflection.
    ///
    /// # Errors
    ///
    /// Returns the [`GrpcError`] of the step that failed, or
    /// [`GrpcError::Timeout`] if the exchange exceeds the call timeout.
    pub async fn discover(&self, service: &str, method: &str) -> Result<Discovery, GrpcError> {
        tokio::time::timeout(self.call_timeout, self.discover_inner(service, method))
            .await
            .map_err(|_| GrpcError::Timeout {
                step: "reflection",
                timeout: self.call_timeout,
            })?
    }

    async fn discover_inner(&self, service: &str, method: &str) -> Result<Discovery, GrpcError> {
        let mut reflection = ReflectionClient::new(self.channel.clone());

        let available = reflection.list_services().await?;
        debug!(services = ?available, "reflection listed services");

        let full_name = resolve_service_name(service, &available).ok_or_else(|| {
            GrpcError::ServiceNotFound {
                service: service.to_string(),
                available: available.clone(),
            }
        })?;

        let file = reflection.file_containing_symbol(&full_name).await?;
        let schema = ServiceSchema::resolve(&file, &full_name, method)?;

        Ok(Discovery { available, schema })
    }

    /// Send `request` to the resolved method.
    ///
    /// # Errors
    ///
    /// Returns [`GrpcError::Invoke`] with the server's status, or
    /// [`GrpcError::Timeout`].
    pub async fn invoke(
        &self,
        schema: &ServiceSchema,
        request: DynamicMessage,
    ) -> Result<DynamicMessage, GrpcError> {
        let method = schema.method_path();
        let path: PathAndQuery = method
            .parse()
            .map_err(|_| GrpcError::InvalidPath(method.clone()))?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(|e| GrpcError::Connect {
            target: self.target.clone(),
            reason: e.to_string(),
        })?;

        let mut request = tonic::Request::new(request);
        request.set_timeout(self.call_timeout);
        let codec = DynamicCodec::new(schema.output.clone());

        let response = tokio::time::timeout(self.call_timeout, grpc.unary(request, path, codec))
            .await
            .map_err(|_| GrpcError::Timeout {
                step: "inference call",
                timeout: self.call_timeout,
            })?
            .map_err(|status| GrpcError::Invoke {
                method: method.clone(),
                status,
            })?;

        Ok(response.into_inner())
    }

    /// Discover, build the request from `input`, call, and print each
    /// response field to `out`.
    ///
    /// # Errors
    ///
    /// Returns the [`GrpcError`] of the first step that failed.
    pub async fn exercise<W: Write>(
        &self,
        out: &mut W,
        service: &str,
        method: &str,
        input: &Map<String, Value>,
    ) -> Result<GrpcInvocation, GrpcError> {
        let Discovery { available, schema } = self.discover(service, method).await?;
        writeln!(out, "Available services: {}", available.join(", "))?;

        let request = DynamicMessage::from_json(schema.input.clone(), input)?;
        let method_path = schema.method_path();
        writeln!(out, "Calling gRPC method: {method_path}")?;
        writeln!(out, "Input message: {request}")?;
        info!(method = %method_path, request = %request, "invoking gRPC method");

        let request_json = request.to_json();
        let response = self.invoke(&schema, request).await?;

        writeln!(out, "Response:")?;
        for (name, value) in response.fields() {
            writeln!(out, "Field: {name}, Value: {value}")?;
        }
        for name in response.skipped() {
            writeln!(out, "Field: {name}, Value: <unsupported type>")?;
        }

        Ok(GrpcInvocation {
            method: method_path,
            request: request_json,
            response: response.to_json(),
            skipped: response.skipped().to_vec(),
        })
    }
}
