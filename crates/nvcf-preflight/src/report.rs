//! Summary of a completed check.

use serde::Serialize;

use crate::config::Protocol;
use crate::grpc::GrpcInvocation;
use crate::http::HttpInferenceReply;
use crate::session::SweepReport;

/// Readiness result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// URL or address probed.
    pub target: String,
    /// Attempt that succeeded.
    pub attempts: u32,
    /// Milliseconds until healthy.
    pub elapsed_ms: u64,
}

/// Inference result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum InferenceReport {
    /// HTTP POST.
    Http(HttpInferenceReply),
    /// gRPC unary call.
    Grpc(GrpcInvocation),
}

/// Everything a successful check observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    /// Image that was tested.
    pub image: String,
    /// Protocol used.
    pub protocol: Protocol,
    /// Short container id.
    pub container_id: String,
    /// Host port the container was reachable on.
    pub host_port: u16,
    /// Pre-launch sweep, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
    /// Readiness.
    pub health: HealthReport,
    /// Inference call, when one was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference: Option<InferenceReport>,
}
