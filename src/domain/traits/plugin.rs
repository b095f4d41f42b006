use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::PluginError;
use crate::application::plugins::PluginContext;
use crate::domain::entities::Manifest;

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Static identity and dependencies
    fn manifest(&self) -> Manifest;

    /// Default config; written to the plugin's config file on first run.
    /// `Value::Null` means the plugin has no config.
    fn config_defaults(&self) -> Value {
        Value::Null
    }

    /// Validate a loaded config. Failure falls back to the defaults.
    fn validate_config(&self, _config: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Called exactly once. Commands, events, components and the exposed
    /// api are registered through `ctx` while this runs.
    async fn init(&self, ctx: Arc<PluginContext>) -> Result<(), PluginError>;

    /// Optional: release resources at process teardown
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
