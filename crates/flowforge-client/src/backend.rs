use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use tracing::debug;

use flowforge_core::config::EndpointConfig;
use flowforge_core::error::{FlowforgeError, Result};

use crate::protocol::{ExecuteRequest, ExecuteResponse, ResponseDelta};
use crate::sse::{decode_frame, SseStream};

/// Execution endpoint — the backend that actually runs the graph.
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Execute the workflow, returning one complete response.
    fn execute(&self, request: ExecuteRequest) -> BoxFuture<'_, Result<ExecuteResponse>>;

    /// Execute the workflow, returning the chunked response stream.
    /// The stream yields content deltas and ends with the `Done`
    /// sentinel; a channel that closes early simply ends.
    fn execute_stream(
        &self,
        request: ExecuteRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<ResponseDelta>>>>;
}

/// HTTP implementation of `ExecutionBackend` against the endpoint in
/// `EndpointConfig`.
pub struct HttpBackend {
    http: Client,
    config: EndpointConfig,
}

impl HttpBackend {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn request(&self, path: &str, body: &ExecuteRequest) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self
            .http
            .post(url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

impl ExecutionBackend for HttpBackend {
    fn execute(&self, request: ExecuteRequest) -> BoxFuture<'_, Result<ExecuteResponse>> {
        Box::pin(async move {
            debug!(
                nodes = request.nodes.len(),
                connections = request.connections.len(),
                session_id = %request.session_id,
                "Sending execute request"
            );
            let response = self
                .request("/api/execute", &request)
                .send()
                .await
                .map_err(|e| FlowforgeError::Backend(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FlowforgeError::Backend(format!(
                    "Endpoint returned {}: {}",
                    status, body
                )));
            }

            response
                .json::<ExecuteResponse>()
                .await
                .map_err(|e| FlowforgeError::Backend(e.to_string()))
        })
    }

    fn execute_stream(
        &self,
        request: ExecuteRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<ResponseDelta>>>> {
        Box::pin(async move {
            debug!(
                nodes = request.nodes.len(),
                session_id = %request.session_id,
                "Opening execute stream"
            );
            let response = self
                .request("/api/execute/stream", &request)
                .send()
                .await
                .map_err(|e| FlowforgeError::Backend(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FlowforgeError::Backend(format!(
                    "Endpoint returned {}: {}",
                    status, body
                )));
            }

            let frames = SseStream::new(response.bytes_stream());
            // Malformed frames decode to None and are dropped here
            // without disturbing the rest of the stream.
            let deltas = frames
                .map(|payload| {
                    let decoded: Vec<Result<ResponseDelta>> = match payload {
                        Ok(data) => decode_frame(&data).map(Ok).into_iter().collect(),
                        Err(e) => vec![Err(e)],
                    };
                    futures::stream::iter(decoded)
                })
                .flatten();

            Ok(Box::pin(deltas) as BoxStream<'static, Result<ResponseDelta>>)
        })
    }
}
