//! Server reflection client.
//!
//! Uses the `v1alpha` reflection service over one bidirectional stream:
//! list services, then fetch the file declaring the chosen service.

use prost::Message;
use prost_types::FileDescriptorProto;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Streaming;
use tonic_reflection::pb::v1alpha::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1alpha::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1alpha::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1alpha::{ServerReflectionRequest, ServerReflectionResponse};
use tracing::debug;

use super::error::GrpcError;

/// One reflection stream. Requests are answered strictly in order.
#[derive(Debug)]
pub struct ReflectionClient {
    client: ServerReflectionClient<Channel>,
    requests: mpsc::Sender<ServerReflectionRequest>,
    pending: Option<mpsc::Receiver<ServerReflectionRequest>>,
    responses: Option<Streaming<ServerReflectionResponse>>,
}

impl ReflectionClient {
    /// Reflection client over an existing channel. The stream opens on the
    /// first request.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        let (requests, pending) = mpsc::channel(4);
        Self {
            client: ServerReflectionClient::new(channel),
            requests,
            pending: Some(pending),
            responses: None,
        }
    }

    /// Names of every advertised service.
    ///
    /// # Errors
    ///
    /// Returns [`GrpcError::ReflectionStream`] if the stream cannot be
    /// opened, or [`GrpcError::ListServices`] for any other failure.
    pub async fn list_services(&mut self) -> Result<Vec<String>, GrpcError> {
        let response = self
            .exchange(MessageRequest::ListServices("*".to_string()))
            .await
            .map_err(|e| e.into_step(GrpcError::ListServices))?;

        match response {
            MessageResponse::ListServicesResponse(list) => {
                Ok(list.service.into_iter().map(|s| s.name).collect())
            }
            other => Err(GrpcError::ListServices(unexpected(&other))),
        }
    }

    /// The file descriptor that declares `symbol`.
    ///
    /// Only the first descriptor in the response is used; dependencies the
    /// server sends after it are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GrpcError::FileDescriptor`] if the exchange fails, or
    /// [`GrpcError::DescriptorDecode`] if the bytes do not parse.
    pub async fn file_containing_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<FileDescriptorProto, GrpcError> {
        let to_error = |reason| GrpcError::FileDescriptor {
            symbol: symbol.to_string(),
            reason,
        };

        let response = self
            .exchange(MessageRequest::FileContainingSymbol(symbol.to_string()))
            .await
            .map_err(|e| e.into_step(to_error))?;

        let files = match response {
            MessageResponse::FileDescriptorResponse(files) => files,
            other => return Err(to_error(unexpected(&other))),
        };
        let first = files
            .file_descriptor_proto
            .first()
            .ok_or_else(|| to_error("no file descriptors returned".to_string()))?;

        let file = FileDescriptorProto::decode(first.as_slice())?;
        debug!(
            symbol,
            file = file.name(),
            dependencies = files.file_descriptor_proto.len() - 1,
            "received file descriptor"
        );
        Ok(file)
    }

    async fn exchange(&mut self, request: MessageRequest) -> Result<MessageResponse, ExchangeError> {
        self.requests
            .send(ServerReflectionRequest {
                host: String::new(),
                message_request: Some(request),
            })
            .await
            .map_err(|_| ExchangeError::Failed("reflection stream closed".to_string()))?;

        // The first request is queued before the stream opens; some servers
        // only send response headers once they have read a request.
        if let Some(pending) = self.pending.take() {
            let stream = self
                .client
                .server_reflection_info(ReceiverStream::new(pending))
                .await
                .map_err(ExchangeError::Open)?;
            self.responses = Some(stream.into_inner());
        }
        let responses = self
            .responses
            .as_mut()
            .ok_or_else(|| ExchangeError::Failed("reflection stream not open".to_string()))?;

        let response = responses
            .message()
            .await
            .map_err(|status| ExchangeError::Failed(status.to_string()))?
            .ok_or_else(|| ExchangeError::Failed("reflection stream ended".to_string()))?;

        match response.message_response {
            Some(MessageResponse::ErrorResponse(err)) => Err(ExchangeError::Failed(format!(
                "server returned error {}: {}",
                err.error_code, err.error_message
            ))),
            Some(message) => Ok(message),
            None => Err(ExchangeError::Failed("empty reflection response".to_string())),
        }
    }
}

enum ExchangeError {
    Open(tonic::Status),
    Failed(String),
}

impl ExchangeError {
    fn into_step(self, step: impl FnOnce(String) -> GrpcError) -> GrpcError {
        match self {
            Self::Open(status) => GrpcError::ReflectionStream(status),
            Self::Failed(reason) => step(reason),
        }
    }
}

fn unexpected(response: &MessageResponse) -> String {
    let kind = match response {
        MessageResponse::FileDescriptorResponse(_) => "file descriptor",
        MessageResponse::AllExtensionNumbersResponse(_) => "extension numbers",
        MessageResponse::ListServicesResponse(_) => "list services",
        MessageResponse::ErrorResponse(_) => "error",
    };
    format!("unexpected {kind} response")
}
