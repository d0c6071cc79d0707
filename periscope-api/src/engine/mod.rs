//! Execution engines.
//!
//! An engine turns a validated query into device output. The orchestrator
//! treats it as an opaque async function: `Ok(Some(_))` is output,
//! `Ok(None)` means the device answered without anything usable, and `Err`
//! is a backend failure.

pub mod agent;
pub mod fake;

use async_trait::async_trait;
use periscope_core::ValidatedQuery;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

pub use agent::AgentEngine;
pub use fake::fake_output;

/// Raw output produced by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineOutput {
    /// Unparsed command output
    Text(String),
    /// Output already parsed into a structured document
    Structured(serde_json::Value),
}

impl EngineOutput {
    /// Serialize for storage.
    ///
    /// Structured encoding is JSON text and always parses back; plain
    /// encoding is the text itself (structured values are rendered as JSON).
    pub fn encode(&self, structured: bool) -> ApiResult<String> {
        match (self, structured) {
            (EngineOutput::Text(text), false) => Ok(text.clone()),
            (EngineOutput::Structured(value), false) => Ok(value.to_string()),
            (EngineOutput::Text(text), true) => Ok(serde_json::to_string(text)?),
            (EngineOutput::Structured(value), true) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl From<String> for EngineOutput {
    fn from(text: String) -> Self {
        EngineOutput::Text(text)
    }
}

impl From<serde_json::Value> for EngineOutput {
    fn from(value: serde_json::Value) -> Self {
        EngineOutput::Structured(value)
    }
}

/// Backend that runs queries against devices.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, query: &ValidatedQuery) -> ApiResult<Option<EngineOutput>>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "engine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_plain_text_is_verbatim() -> ApiResult<()> {
        let output = EngineOutput::Text("line1\nline2".to_string());
        assert_eq!(output.encode(false)?, "line1\nline2");
        Ok(())
    }

    #[test]
    fn test_encode_structured_round_trips() -> ApiResult<()> {
        let value = json!({"routes": [{"prefix": "192.0.2.0/24"}], "count": 1});
        let encoded = EngineOutput::Structured(value.clone()).encode(true)?;
        let decoded: serde_json::Value = serde_json::from_str(&encoded)?;
        assert_eq!(decoded, value);
        Ok(())
    }

    #[test]
    fn test_encode_text_as_structured_is_json_string() -> ApiResult<()> {
        let encoded = EngineOutput::Text("raw".to_string()).encode(true)?;
        assert_eq!(encoded, "\"raw\"");
        Ok(())
    }
}
