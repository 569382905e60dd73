use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Every way a gateway request can fail; each maps to a `{error}` envelope
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid request id")]
    InvalidRequestId,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Body extraction refused by the framework (size limit, bad encoding)
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Validation(_) | GatewayError::InvalidRequestId => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { status, .. } | GatewayError::Rejected { status, .. } => *status,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            GatewayError::Internal(message) => tracing::error!("Gateway error: {}", message),
            GatewayError::MissingApiKey => tracing::error!("Rejecting request: API key not configured"),
            other => tracing::debug!(status = status.as_u16(), "Request failed: {}", other),
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_error_envelope() {
        let resp = GatewayError::Validation("nope".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({"error": "nope"}));
    }

    #[test]
    fn upstream_status_is_relayed() {
        let err = GatewayError::Upstream {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "bad".to_string(),
        };
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(GatewayError::MissingApiKey.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(GatewayError::NotFound.to_string(), "Not found");
    }
}
