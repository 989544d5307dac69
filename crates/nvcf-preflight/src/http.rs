//! HTTP inference exerciser.
//!
//! POSTs a JSON payload and echoes what comes back. Server-sent event
//! responses are relayed line by line as they arrive.

use std::io::Write;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::error::HttpInferenceError;

const EVENT_STREAM: &str = "text/event-stream";

/// Body of an inference response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum ReplyBody {
    /// Lines of a `text/event-stream` response.
    Stream(Vec<String>),
    /// Body that parsed as JSON.
    Json(Value),
    /// Anything else.
    Text(String),
}

/// Outcome of one inference request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpInferenceReply {
    /// Request URL.
    pub url: String,
    /// Response status code.
    pub status: u16,
    /// Response `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: ReplyBody,
}

impl HttpInferenceReply {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends inference requests to a container's published port.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
}

impl HttpInferenceClient {
    /// Client for `base_url` (e.g. `http://127.0.0.1:18080`).
    ///
    /// `read_timeout` bounds the wait for response headers and for a
    /// non-streaming body. An event stream may take as long as the model
    /// needs once its headers have arrived.
    ///
    /// # Errors
    ///
    /// Returns [`HttpInferenceError::Client`] if the client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, HttpInferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(HttpInferenceError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            read_timeout,
        })
    }

    fn timed_out(&self, url: &str) -> HttpInferenceError {
        warn!(%url, timeout_secs = self.read_timeout.as_secs(), "inference request timed out");
        HttpInferenceError::Timeout {
            url: url.to_string(),
            timeout: self.read_timeout,
        }
    }

    /// URL for a request path.
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url.trim_end_matches('/'))
    }

    /// POST `payload` to `endpoint`, printing status, headers and body to
    /// `out`.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures; any status is reported.
    pub async fn invoke<W: Write>(
        &self,
        out: &mut W,
        endpoint: &str,
        payload: &Value,
    ) -> Result<HttpInferenceReply, HttpInferenceError> {
        let url = self.url(endpoint);
        writeln!(out, "Sending payload to {url}...")?;
        info!(%url, "sending inference request");

        let request = self.client.post(&url).json(payload).send();
        let response = timeout(self.read_timeout, request)
            .await
            .map_err(|_| self.timed_out(&url))?
            .map_err(|source| HttpInferenceError::Send {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        writeln!(out, "Server's response status: {status}")?;
        writeln!(out, "Server's response headers:")?;
        for (name, value) in response.headers() {
            writeln!(out, "  {name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(status = status.as_u16(), content_type = ?content_type, "received response");

        let body = if content_type.as_deref().is_some_and(is_event_stream) {
            writeln!(out, "Received a streaming response:")?;
            let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
            let mut lines = StreamReader::new(stream).lines();
            let mut collected = Vec::new();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(HttpInferenceError::ReadStream)?
            {
                writeln!(out, "{line}")?;
                out.flush()?;
                collected.push(line);
            }
            ReplyBody::Stream(collected)
        } else {
            let text = timeout(self.read_timeout, response.text())
                .await
                .map_err(|_| self.timed_out(&url))?
                .map_err(HttpInferenceError::ReadBody)?;
            writeln!(out, "Server's response body: {text}")?;
            match serde_json::from_str::<Value>(&text) {
                Ok(json) => {
                    let pretty =
                        serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.clone());
                    writeln!(out, "Parsed JSON response:\n{pretty}")?;
                    ReplyBody::Json(json)
                }
                Err(_) => ReplyBody::Text(text),
            }
        };

        Ok(HttpInferenceReply {
            url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(EVENT_STREAM))
}
