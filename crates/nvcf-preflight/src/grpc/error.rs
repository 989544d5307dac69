//! gRPC exercise errors.

use std::time::Duration;

use thiserror::Error;

/// A JSON input value could not be placed into a request field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    /// No field with this name in the input message.
    #[error("field {field} not found in message {message}")]
    Unknown {
        /// Field name from the input map.
        field: String,
        /// Fully-qualified message name.
        message: String,
    },

    /// JSON value has the wrong shape for the field's kind.
    #[error("field {field} expects a {expected} value, got {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected kind.
        expected: &'static str,
        /// JSON kind that was supplied.
        found: &'static str,
    },

    /// Number does not fit a 32-bit field.
    #[error("field {field} value {value} is out of range for {kind}")]
    OutOfRange {
        /// Field name.
        field: String,
        /// Supplied value as written.
        value: String,
        /// Protobuf type of the field.
        kind: &'static str,
    },

    /// The field's kind cannot be populated from flat JSON.
    #[error("field {field} has unsupported type {kind}")]
    Unsupported {
        /// Field name.
        field: String,
        /// Proto kind, e.g. `bytes` or `repeated string`.
        kind: String,
    },
}

impl FieldError {
    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Unknown { field, .. }
            | Self::TypeMismatch { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::Unsupported { field, .. } => field,
        }
    }
}

/// gRPC inference errors, one variant per step.
#[derive(Debug, Error)]
pub enum GrpcError {
    /// The target address is not a valid URI.
    #[error("invalid gRPC target {target}: {reason}")]
    InvalidTarget {
        /// Address.
        target: String,
        /// Parse error.
        reason: String,
    },

    /// Dial failed within the connect timeout.
    #[error("failed to connect to gRPC server at {target}: {reason}")]
    Connect {
        /// Address.
        target: String,
        /// Transport error.
        reason: String,
    },

    /// The reflection stream could not be opened.
    #[error("failed to create reflection stream: {0}")]
    ReflectionStream(#[source] tonic::Status),

    /// The list-services exchange failed.
    #[error("failed to list services: {0}")]
    ListServices(String),

    /// The requested service is not advertised.
    #[error("service {service} not found (available: {})", available.join(", "))]
    ServiceNotFound {
        /// Requested name.
        service: String,
        /// Advertised names.
        available: Vec<String>,
    },

    /// The file-containing-symbol exchange failed.
    #[error("failed to get file descriptor for {symbol}: {reason}")]
    FileDescriptor {
        /// Symbol requested.
        symbol: String,
        /// Why.
        reason: String,
    },

    /// The descriptor bytes did not parse.
    #[error("failed to decode file descriptor: {0}")]
    DescriptorDecode(#[from] prost::DecodeError),

    /// The descriptor does not declare the service.
    #[error("service {service} not found in file descriptor {file}")]
    ServiceNotInDescriptor {
        /// Service name.
        service: String,
        /// Descriptor file name.
        file: String,
    },

    /// The service has no method with this name.
    #[error("method {method} not found in service {service}")]
    MethodNotFound {
        /// Method name.
        method: String,
        /// Service name.
        service: String,
    },

    /// Client or server streaming methods are not invoked.
    #[error("method {method} is streaming; only unary methods can be called")]
    StreamingMethod {
        /// Method name.
        method: String,
    },

    /// Input or output message type is not in the descriptor file.
    #[error("message type {type_name} not found in file descriptor")]
    MessageTypeNotFound {
        /// Fully-qualified type name.
        type_name: String,
    },

    /// A request field could not be set.
    #[error("failed to set field: {0}")]
    Field(#[from] FieldError),

    /// The call path is not a valid HTTP path.
    #[error("invalid method path {0}")]
    InvalidPath(String),

    /// The RPC returned a non-OK status.
    #[error("failed to invoke {method}: {status}")]
    Invoke {
        /// `/service/method` path.
        method: String,
        /// Status returned.
        status: tonic::Status,
    },

    /// A step did not finish within the call timeout.
    #[error("{step} timed out after {}s", timeout.as_secs())]
    Timeout {
        /// Step name.
        step: &'static str,
        /// Limit that was hit.
        timeout: Duration,
    },

    /// Writing progress output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
