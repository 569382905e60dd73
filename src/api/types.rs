use serde::{Deserialize, Serialize};

use crate::core::GenerationStatus;

/// Body returned by `/generate`
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub queue_position: Option<u32>,
}

/// Body returned by `/status/{id}`
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    /// Missing status is treated like any other non-terminal state
    #[serde(default)]
    pub status: Option<GenerationStatus>,
    #[serde(default)]
    pub queue_position: Option<u32>,
}

impl StatusResponse {
    pub fn status(&self) -> GenerationStatus {
        self.status
            .clone()
            .unwrap_or_else(|| GenerationStatus::Other(String::new()))
    }
}

/// Body returned by `/` and `/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Uniform failure envelope produced by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<String>,
}
