//! Calls to the queue-based generation API the gateway fronts.

use async_trait::async_trait;
use axum::http::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use super::error::GatewayError;
use crate::http_client::HTTP_CLIENT;

/// Normalized submission body sent upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamPayload {
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub num_images: u32,
    pub output_format: String,
}

/// Raw upstream answer: status plus whatever JSON it sent
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Value,
}

impl UpstreamReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// Message from the upstream error body, if it carries one
    pub fn error_detail(&self) -> Option<String> {
        ["detail", "error"].iter().find_map(|field| match self.body.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn submit(
        &self,
        api_key: &SecretString,
        payload: &UpstreamPayload,
    ) -> Result<UpstreamReply, GatewayError>;

    async fn status(&self, api_key: &SecretString, request_id: &str)
        -> Result<UpstreamReply, GatewayError>;

    async fn result(&self, api_key: &SecretString, request_id: &str)
        -> Result<UpstreamReply, GatewayError>;
}

/// fal.ai queue endpoints
pub struct FalUpstream {
    submit_url: String,
    requests_url: String,
}

impl FalUpstream {
    pub fn new(submit_url: impl Into<String>, requests_url: impl Into<String>) -> Self {
        Self {
            submit_url: submit_url.into(),
            requests_url: requests_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(api_key: &SecretString) -> String {
        format!("Key {}", api_key.expose_secret())
    }
}

#[async_trait]
impl Upstream for FalUpstream {
    async fn submit(
        &self,
        api_key: &SecretString,
        payload: &UpstreamPayload,
    ) -> Result<UpstreamReply, GatewayError> {
        tracing::debug!(
            url = %self.submit_url,
            images = payload.image_urls.len(),
            "Forwarding submission upstream"
        );

        let response = HTTP_CLIENT
            .post(&self.submit_url)
            .header("Authorization", Self::auth_header(api_key))
            .json(payload)
            .send()
            .await?;

        read_reply(response).await
    }

    async fn status(
        &self,
        api_key: &SecretString,
        request_id: &str,
    ) -> Result<UpstreamReply, GatewayError> {
        let url = format!("{}/{}/status", self.requests_url, request_id);
        tracing::debug!(url = %url, "Forwarding status check upstream");

        let response = HTTP_CLIENT
            .get(&url)
            .header("Authorization", Self::auth_header(api_key))
            .send()
            .await?;

        read_reply(response).await
    }

    async fn result(
        &self,
        api_key: &SecretString,
        request_id: &str,
    ) -> Result<UpstreamReply, GatewayError> {
        let url = format!("{}/{}", self.requests_url, request_id);
        tracing::debug!(url = %url, "Forwarding result fetch upstream");

        let response = HTTP_CLIENT
            .get(&url)
            .header("Authorization", Self::auth_header(api_key))
            .send()
            .await?;

        read_reply(response).await
    }
}

/// Read an upstream response body as JSON.
///
/// A failed upstream call with a non-JSON body still yields a reply so the
/// status can be relayed; a 2xx with a non-JSON body is an internal error.
async fn read_reply(response: reqwest::Response) -> Result<UpstreamReply, GatewayError> {
    let status = response.status();
    let text = response.text().await?;

    tracing::debug!("Upstream response status: {}", status);

    match serde_json::from_str::<Value>(&text) {
        Ok(body) => Ok(UpstreamReply { status, body }),
        Err(_) if !status.is_success() => Ok(UpstreamReply {
            status,
            body: Value::Null,
        }),
        Err(e) => Err(GatewayError::Internal(format!(
            "Upstream returned invalid JSON: {}",
            e
        ))),
    }
}
