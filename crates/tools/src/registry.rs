//! Tool Registry
//!
//! Manages tool registration, discovery, and execution.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use call_bridge_config::ToolsConfig;

use crate::tool::{Tool, ToolError, ToolSchema};
use crate::web_fetch::WebFetchTool;

/// Runs tools on behalf of the AI
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Execute a tool by name
    async fn run(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;

    /// Tools to declare to the AI
    fn declarations(&self) -> Vec<ToolSchema>;
}

/// Tool registry
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ToolRegistry {
    /// Validate, then execute under the tool's own timeout
    async fn run(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::not_found(name))?;

        tool.validate(&arguments)?;

        let timeout_secs = tool.timeout_secs();
        tracing::trace!(tool = name, timeout_secs, "Executing tool with timeout");

        match tokio::time::timeout(Duration::from_secs(timeout_secs), tool.execute(arguments)).await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::timeout(name, timeout_secs)),
        }
    }

    fn declarations(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

/// Build the registry described by configuration
pub fn create_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if !config.enabled {
        return registry;
    }
    if config.web_fetch.enabled {
        match WebFetchTool::new(&config.web_fetch) {
            Ok(tool) => registry.register(tool),
            Err(e) => tracing::warn!(error = %e, "web_fetch tool unavailable"),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(json!({"echo": arguments["text"]}))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        fn timeout_secs(&self) -> u64 {
            1
        }

        async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(EchoTool);
        assert_eq!(registry.len(), 1);
        assert!(registry.has("echo"));
        assert_eq!(registry.declarations()[0].name, "echo");
    }

    #[tokio::test]
    async fn test_run_and_validate() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let out = registry.run("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, json!({"echo": "hi"}));

        let missing = registry.run("echo", json!({})).await;
        assert!(matches!(missing, Err(ToolError::InvalidParams(_))));

        let not_object = registry.run("echo", json!("hi")).await;
        assert!(matches!(not_object, Err(ToolError::InvalidParams(_))));

        let unknown = registry.run("nope", json!({})).await;
        assert!(matches!(unknown, Err(ToolError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);

        let result = registry.run("slow", json!({})).await;
        assert_eq!(result, Err(ToolError::timeout("slow", 1)));
    }

    #[test]
    fn test_create_registry_from_config() {
        let registry = create_registry(&ToolsConfig::default());
        assert!(registry.has("web_fetch"));

        let disabled = create_registry(&ToolsConfig {
            enabled: false,
            ..ToolsConfig::default()
        });
        assert!(disabled.is_empty());
    }
}
