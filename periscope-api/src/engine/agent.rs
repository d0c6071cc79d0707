//! HTTP agent engine.
//!
//! Each device may name an `agent_url`: a small service running next to the
//! device that accepts a query and returns its output. The engine POSTs the
//! query identity as JSON and expects
//!
//! ```json
//! { "output": "<text>" | { ... } | null }
//! ```
//!
//! back. A `null` (or missing) output is the "no usable result" signal.

use std::time::Duration;

use async_trait::async_trait;
use periscope_core::ValidatedQuery;
use serde::{Deserialize, Serialize};

use super::{EngineOutput, ExecutionEngine};
use crate::constants::USER_AGENT;
use crate::error::{ApiError, ApiResult};

/// Request body sent to an agent.
#[derive(Debug, Clone, Serialize)]
struct AgentRequest<'a> {
    query_type: &'a str,
    query_vrf: &'a str,
    query_target: &'a str,
    device: &'a str,
}

/// Response body returned by an agent.
#[derive(Debug, Clone, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    output: Option<EngineOutput>,
}

/// Engine that forwards queries to per-device HTTP agents.
#[derive(Debug, Clone)]
pub struct AgentEngine {
    client: reqwest::Client,
}

impl AgentEngine {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionEngine for AgentEngine {
    async fn execute(&self, query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>> {
        let device = query.device();
        let url = device.agent_url.as_deref().ok_or_else(|| {
            ApiError::backend_error(format!("Device {} has no agent configured", device.name))
        })?;

        let inner = query.query();
        let body = AgentRequest {
            query_type: inner.query_type.as_str(),
            query_vrf: &inner.query_vrf,
            query_target: &inner.query_target,
            device: &device.name,
        };

        let response = self.client.post(url).json(&body).send().await.map_err(|e| {
            tracing::warn!(device = %device.name, error = %e, "Agent request failed");
            if e.is_timeout() {
                ApiError::timeout(format!("Agent for {} timed out", device.name))
            } else {
                ApiError::backend_error(format!("Agent for {} unreachable", device.name))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(device = %device.name, status = %status, "Agent returned error status");
            return Err(ApiError::backend_error(format!(
                "Agent for {} returned {}",
                device.name, status
            )));
        }

        let parsed: AgentResponse = response.json().await.map_err(|e| {
            tracing::warn!(device = %device.name, error = %e, "Agent returned malformed body");
            ApiError::backend_error(format!("Agent for {} returned a malformed response", device.name))
        })?;

        Ok(parsed.output)
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}
