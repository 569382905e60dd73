mod types;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

pub use types::*;

use crate::core::{GenerationRequest, GenerationResult, MagicError, RequestHandle};
use crate::http_client::HTTP_CLIENT;

/// Largest result image we are willing to buffer
const MAX_DOWNLOAD_BYTES: usize = 64 * 1024 * 1024;

/// The calls the orchestrator makes over the network
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Submit a generation and return the upstream correlation handle
    async fn submit(&self, request: &GenerationRequest) -> Result<RequestHandle, MagicError>;

    async fn status(&self, handle: &RequestHandle) -> Result<StatusResponse, MagicError>;

    async fn result(&self, handle: &RequestHandle) -> Result<GenerationResult, MagicError>;

    /// Fetch the bytes behind a result URL
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, MagicError>;
}

/// HTTP client for a deployed gateway
pub struct GatewayClient {
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call the gateway's liveness probe
    pub async fn health(&self) -> Result<HealthResponse, MagicError> {
        let url = format!("{}/health", self.base_url);
        let response = HTTP_CLIENT.get(&url).send().await?;
        read_json(response, |status| format!("Health check failed: {}", status.as_u16())).await
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<RequestHandle, MagicError> {
        let url = format!("{}/generate", self.base_url);
        tracing::debug!("Submitting generation to: {}", url);

        let response = HTTP_CLIENT.post(&url).json(request).send().await?;
        let body: SubmitResponse =
            read_json(response, |status| format!("API Error: {}", status.as_u16())).await?;

        tracing::debug!(
            request_id = ?body.request_id,
            queue_position = ?body.queue_position,
            "Submission accepted"
        );

        match body.request_id {
            Some(id) if !id.is_empty() => RequestHandle::parse(id),
            _ => Err(MagicError::Protocol(
                "No request ID received from API".to_string(),
            )),
        }
    }

    async fn status(&self, handle: &RequestHandle) -> Result<StatusResponse, MagicError> {
        let url = format!("{}/status/{}", self.base_url, handle.as_str());
        let response = HTTP_CLIENT.get(&url).send().await?;
        read_json(response, |status| format!("Status check failed: {}", status.as_u16())).await
    }

    async fn result(&self, handle: &RequestHandle) -> Result<GenerationResult, MagicError> {
        let url = format!("{}/result/{}", self.base_url, handle.as_str());
        let response = HTTP_CLIENT.get(&url).send().await?;
        read_json(response, |status| format!("Result fetch failed: {}", status.as_u16())).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, MagicError> {
        let response = HTTP_CLIENT.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MagicError::Download(format!("image host answered {}", status)));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > MAX_DOWNLOAD_BYTES {
                return Err(MagicError::Download("image exceeds download limit".to_string()));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}

/// Decode a gateway response, mapping non-2xx to `UpstreamHttp`.
///
/// The gateway's `{error}` message wins; `fallback` covers bodies that
/// carry none.
async fn read_json<T: DeserializeOwned>(
    response: Response,
    fallback: impl FnOnce(StatusCode) -> String,
) -> Result<T, MagicError> {
    let status = response.status();
    let body = response.text().await?;

    tracing::debug!("Response status: {}", status);

    if !status.is_success() {
        let envelope: ErrorEnvelope = serde_json::from_str(&body).unwrap_or_default();
        let message = envelope
            .error
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback(status));
        return Err(MagicError::UpstreamHttp {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| MagicError::Protocol(format!("Invalid response from gateway: {}", e)))
}
