//! Tool trait, declarations and errors

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Default timeout for tool execution (30 seconds)
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Declaration sent to the AI so it knows how to call a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

/// Tool errors, returned to the AI as structured results
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn timeout(tool: &str, secs: u64) -> Self {
        Self::Timeout {
            tool: tool.to_string(),
            secs,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidParams(_) => "invalid_params",
            Self::Timeout { .. } => "timeout",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }

    /// Error payload handed back to the AI in place of a result
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ToolError::Upstream(format!("request timed out: {}", err))
        } else {
            ToolError::Upstream(err.to_string())
        }
    }
}

/// A tool the AI can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    /// Per-tool execution timeout
    fn timeout_secs(&self) -> u64 {
        DEFAULT_TOOL_TIMEOUT_SECS
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Check the arguments are an object carrying every required property
    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let object = arguments
            .as_object()
            .ok_or_else(|| ToolError::invalid_params("arguments must be a JSON object"))?;

        let schema = self.parameters();
        let required = schema
            .get("required")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        for field in required.iter().filter_map(|f| f.as_str()) {
            if !object.contains_key(field) {
                return Err(ToolError::invalid_params(format!("{} is required", field)));
            }
        }
        Ok(())
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}
