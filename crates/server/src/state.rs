//! Application State
//!
//! Shared state across all handlers.

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use call_bridge_config::Settings;
use call_bridge_tools::{create_registry, create_resolver, InstructionResolver, ToolRunner};
use call_bridge_transport::{AiConnector, RealtimeConnector};

use crate::ServerError;

/// Snapshot of one live call
#[derive(Debug, Clone, Serialize)]
pub struct CallInfo {
    pub id: String,
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ai_connected: bool,
}

/// Live calls, keyed by connection id
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    calls: Arc<RwLock<HashMap<String, CallInfo>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str) {
        let info = CallInfo {
            id: id.to_string(),
            stream_sid: None,
            call_sid: None,
            started_at: Utc::now(),
            ai_connected: false,
        };
        self.calls.write().insert(id.to_string(), info);
    }

    /// Apply `f` to the call if it is still registered
    pub fn update<F: FnOnce(&mut CallInfo)>(&self, id: &str, f: F) {
        if let Some(info) = self.calls.write().get_mut(id) {
            f(info);
        }
    }

    pub fn remove(&self, id: &str) -> Option<CallInfo> {
        self.calls.write().remove(id)
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    /// Calls ordered by start time
    pub fn list(&self) -> Vec<CallInfo> {
        let mut calls: Vec<CallInfo> = self.calls.read().values().cloned().collect();
        calls.sort_by_key(|c| c.started_at);
        calls
    }
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub calls: CallRegistry,
    pub tools: Arc<dyn ToolRunner>,
    pub instructions: Arc<dyn InstructionResolver>,
    pub connector: Arc<dyn AiConnector>,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the production collaborators from settings
    pub fn new(settings: Settings) -> Result<Self, ServerError> {
        let tools: Arc<dyn ToolRunner> = Arc::new(create_registry(&settings.tools));
        let instructions = create_resolver(&settings.instructions);
        let connector: Arc<dyn AiConnector> = Arc::new(RealtimeConnector::new(&settings.realtime)?);
        Ok(Self::with_parts(settings, tools, instructions, connector))
    }

    pub fn with_parts(
        settings: Settings,
        tools: Arc<dyn ToolRunner>,
        instructions: Arc<dyn InstructionResolver>,
        connector: Arc<dyn AiConnector>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            calls: CallRegistry::new(),
            tools,
            instructions,
            connector,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Whether the AI leg can authenticate
    pub fn has_api_key(&self) -> bool {
        self.settings
            .realtime
            .api_key
            .as_deref()
            .map_or(false, |k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lifecycle() {
        let registry = CallRegistry::new();
        registry.register("a");
        registry.register("b");
        assert_eq!(registry.count(), 2);

        registry.update("a", |info| {
            info.stream_sid = Some("MZ1".to_string());
            info.ai_connected = true;
        });
        let a = registry.list().into_iter().find(|c| c.id == "a").unwrap();
        assert_eq!(a.stream_sid.as_deref(), Some("MZ1"));
        assert!(a.ai_connected);

        // Unknown ids are ignored
        registry.update("zzz", |info| info.ai_connected = true);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_state_from_default_settings() {
        let state = AppState::new(Settings::default()).unwrap();
        assert_eq!(state.calls.count(), 0);
        assert!(state.metrics.is_none());
        assert!(state
            .tools
            .declarations()
            .iter()
            .any(|d| d.name == "web_fetch"));
    }

    #[test]
    fn test_bad_realtime_url_fails() {
        let mut settings = Settings::default();
        settings.realtime.url = "not a url".to_string();
        assert!(AppState::new(settings).is_err());
    }
}
