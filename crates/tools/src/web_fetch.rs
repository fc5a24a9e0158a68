//! Web fetch tool
//!
//! Lets the assistant read a public web page or JSON endpoint during a call.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;

use call_bridge_config::WebFetchConfig;

use crate::tool::{Tool, ToolError};

pub struct WebFetchTool {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: usize,
}

impl WebFetchTool {
    pub fn new(config: &WebFetchConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("call-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
            max_bytes: config.max_bytes,
        })
    }

    fn parse_url(arguments: &Value) -> Result<Url, ToolError> {
        let raw = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid_params("url is required"))?;

        let url = Url::parse(raw)
            .map_err(|e| ToolError::invalid_params(format!("invalid url {}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ToolError::invalid_params(format!(
                "unsupported scheme {}",
                other
            ))),
        }
    }
}

/// Cut `body` to at most `max` bytes without splitting a UTF-8 sequence
fn truncate_utf8(body: &str, max: usize) -> (&str, bool) {
    if body.len() <= max {
        return (body, false);
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    (&body[..end], true)
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page or API URL over HTTP GET and return its text content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http or https URL"
                }
            },
            "required": ["url"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        // Leave room for the client's own timeout to report first
        self.timeout_secs + 1
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let url = Self::parse_url(&arguments)?;
        tracing::debug!(url = %url, "Fetching URL for tool call");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        let text = String::from_utf8_lossy(&bytes);
        let (body, truncated) = truncate_utf8(&text, self.max_bytes);

        Ok(json!({
            "url": url.as_str(),
            "status": status.as_u16(),
            "content_type": content_type,
            "body": body,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(WebFetchTool::parse_url(&json!({"url": "https://example.com/a"})).is_ok());
        assert!(matches!(
            WebFetchTool::parse_url(&json!({"url": "ftp://example.com"})),
            Err(ToolError::InvalidParams(_))
        ));
        assert!(matches!(
            WebFetchTool::parse_url(&json!({"url": "not a url"})),
            Err(ToolError::InvalidParams(_))
        ));
        assert!(WebFetchTool::parse_url(&json!({})).is_err());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_utf8("hello", 10), ("hello", false));
        assert_eq!(truncate_utf8("hello", 3), ("hel", true));
        // "é" is two bytes; cutting inside it backs off
        assert_eq!(truncate_utf8("aé", 2), ("a", true));
    }

    #[test]
    fn test_schema() {
        let tool = WebFetchTool::new(&WebFetchConfig::default()).unwrap();
        let schema = tool.schema();
        assert_eq!(schema.name, "web_fetch");
        assert_eq!(schema.parameters["required"], json!(["url"]));
        assert_eq!(tool.timeout_secs(), 11);
    }
}
