//! Function call assembly
//!
//! The AI announces a function call with `response.output_item.added`,
//! streams its JSON arguments in deltas keyed by `call_id`, and closes it with
//! `response.function_call_arguments.done`. Calls may interleave.

use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolCallError {
    #[error("tool call {call_id} has no function name")]
    MissingName { call_id: String },

    #[error("tool call {call_id} ({name}) has invalid arguments: {message}")]
    InvalidArguments {
        call_id: String,
        name: String,
        message: String,
    },
}

impl ToolCallError {
    pub fn call_id(&self) -> &str {
        match self {
            Self::MissingName { call_id } | Self::InvalidArguments { call_id, .. } => call_id,
        }
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: HashMap<String, PendingCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_item_added(&mut self, call_id: &str, name: Option<&str>) {
        let entry = self.pending.entry(call_id.to_string()).or_default();
        if let Some(name) = name {
            entry.name = Some(name.to_string());
        }
    }

    pub fn push_delta(&mut self, call_id: &str, delta: &str) {
        self.pending
            .entry(call_id.to_string())
            .or_default()
            .arguments
            .push_str(delta);
    }

    /// Finish a call. A non-empty `arguments` on the done event wins over
    /// the streamed deltas; an empty argument string means `{}`.
    pub fn complete(
        &mut self,
        call_id: &str,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> Result<CompletedToolCall, ToolCallError> {
        let pending = self.pending.remove(call_id).unwrap_or_default();

        let name = name
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or(pending.name)
            .ok_or_else(|| ToolCallError::MissingName {
                call_id: call_id.to_string(),
            })?;

        let raw = arguments
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&pending.arguments);

        let arguments = if raw.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| ToolCallError::InvalidArguments {
                call_id: call_id.to_string(),
                name: name.clone(),
                message: e.to_string(),
            })?
        };

        Ok(CompletedToolCall {
            call_id: call_id.to_string(),
            name,
            arguments,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
