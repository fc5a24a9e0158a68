//! Instruction lookup
//!
//! The telephony start event may carry a key naming which assistant the
//! caller reached. A resolver maps that key to instruction text; an empty
//! answer means "use the default".

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use call_bridge_config::InstructionsConfig;

use crate::tool::ToolError;

#[async_trait]
pub trait InstructionResolver: Send + Sync {
    /// Instruction text for `key`, or None when the key is unknown
    async fn resolve(&self, key: &str) -> Result<Option<String>, ToolError>;
}

/// Fixed key -> instructions table
#[derive(Debug, Clone, Default)]
pub struct StaticInstructions {
    entries: HashMap<String, String>,
}

impl StaticInstructions {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl InstructionResolver for StaticInstructions {
    async fn resolve(&self, key: &str) -> Result<Option<String>, ToolError> {
        Ok(self
            .entries
            .get(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}

/// Remote catalog serving `GET {base_url}/{key}`
///
/// Accepts a JSON body with an `instructions` (or `prompt`) string, or plain
/// text. A 404 is an unknown key, not an error.
pub struct HttpInstructionCatalog {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpInstructionCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ToolError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ToolError::invalid_params(format!("catalog url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ToolError::invalid_params("catalog url cannot be a base"));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// URL for one key, percent-encoded as a single path segment
    pub fn url_for(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(key);
        }
        url
    }
}

fn extract_instructions(body: &str) -> Option<String> {
    let text = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["instructions", "prompt"]
            .iter()
            .find_map(|field| map.get(*field).and_then(|v| v.as_str()))
            .map(str::to_string)?,
        Ok(Value::String(s)) => s,
        Ok(_) => return None,
        Err(_) => body.to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl InstructionResolver for HttpInstructionCatalog {
    async fn resolve(&self, key: &str) -> Result<Option<String>, ToolError> {
        let url = self.url_for(key);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.text().await?;
                Ok(extract_instructions(&body))
            },
            status => Err(ToolError::Upstream(format!(
                "instruction catalog returned {}",
                status
            ))),
        }
    }
}

/// Pick the resolver described by configuration
pub fn create_resolver(config: &InstructionsConfig) -> Arc<dyn InstructionResolver> {
    if let Some(base) = &config.catalog_url {
        match HttpInstructionCatalog::new(base, Duration::from_millis(config.lookup_timeout_ms)) {
            Ok(catalog) => return Arc::new(catalog),
            Err(e) => {
                tracing::warn!(error = %e, "Instruction catalog unusable, using static entries")
            },
        }
    }
    Arc::new(StaticInstructions::new(config.entries.clone()))
}

/// Final instruction text: the resolved (or default) text plus the language rule
pub fn compose_instructions(resolved: Option<&str>, default: &str, language: Option<&str>) -> String {
    let base = resolved
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default);
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!("{}\n\nAlways respond in {}.", base, lang),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_lookup() {
        let mut entries = HashMap::new();
        entries.insert("sales".to_string(), "Sell things.".to_string());
        entries.insert("blank".to_string(), "   ".to_string());
        let resolver = StaticInstructions::new(entries);

        assert_eq!(resolver.resolve("sales").await.unwrap().as_deref(), Some("Sell things."));
        assert_eq!(resolver.resolve("blank").await.unwrap(), None);
        assert_eq!(resolver.resolve("missing").await.unwrap(), None);
    }

    #[test]
    fn test_catalog_url_encoding() {
        let catalog =
            HttpInstructionCatalog::new("https://catalog.local/assistants/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            catalog.url_for("front desk").as_str(),
            "https://catalog.local/assistants/front%20desk"
        );
        assert_eq!(
            catalog.url_for("a/b").as_str(),
            "https://catalog.local/assistants/a%2Fb"
        );
        assert!(HttpInstructionCatalog::new("mailto:x@y", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_extract_instructions() {
        assert_eq!(
            extract_instructions(r#"{"instructions": " Be brief. "}"#).as_deref(),
            Some("Be brief.")
        );
        assert_eq!(
            extract_instructions(r#"{"prompt": "Be kind."}"#).as_deref(),
            Some("Be kind.")
        );
        assert_eq!(extract_instructions(r#"{"other": 1}"#), None);
        assert_eq!(extract_instructions("plain text").as_deref(), Some("plain text"));
        assert_eq!(extract_instructions(""), None);
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose_instructions(None, "Default.", None), "Default.");
        assert_eq!(compose_instructions(Some("  "), "Default.", None), "Default.");
        assert_eq!(
            compose_instructions(Some("Custom."), "Default.", Some("Spanish")),
            "Custom.\n\nAlways respond in Spanish."
        );
    }

    #[test]
    fn test_create_resolver_falls_back() {
        let config = InstructionsConfig {
            catalog_url: Some("::bad::".to_string()),
            ..InstructionsConfig::default()
        };
        // Falls back to the static table instead of failing
        let _resolver = create_resolver(&config);
    }
}
