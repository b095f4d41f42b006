use std::fmt::Display;

/// Structured logger stamping every record with its plugin's name
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: String,
}

impl PluginLogger {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    pub fn info(&self, msg: impl Display) {
        tracing::info!(plugin = %self.plugin, "{}", msg);
    }

    pub fn warn(&self, msg: impl Display) {
        tracing::warn!(plugin = %self.plugin, "{}", msg);
    }

    pub fn error(&self, msg: impl Display) {
        tracing::error!(plugin = %self.plugin, "{}", msg);
    }

    pub fn debug(&self, msg: impl Display) {
        tracing::debug!(plugin = %self.plugin, "{}", msg);
    }
}
