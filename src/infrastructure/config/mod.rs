//! Configuration management

pub mod plugin_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::errors::ConfigError;
use crate::domain::traits::platform::DEFAULT_CUSTOM_ID_LIMIT;
use crate::infrastructure::database::BackendKind;

pub use plugin_config::PluginConfigStore;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub plugins: PluginsConfig,
    pub components: ComponentsConfig,
    pub adapters: AdaptersConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    /// Channel that receives narrow-scope command registration during development
    pub dev_channel: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "plexus".to_string(),
            prefix: "/".to_string(),
            dev_channel: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    /// Storage file; in-memory when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginsConfig {
    /// Directory holding one `<plugin>.yaml` per plugin
    pub config_dir: PathBuf,
    pub disabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("./config/plugins"),
            disabled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ComponentsConfig {
    /// Upper bound on custom ids; the platform's own ceiling wins when lower
    pub custom_id_limit: usize,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            custom_id_limit: DEFAULT_CUSTOM_ID_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            telegram: Some(TelegramConfig {
                enabled: false,
                token: None,
            }),
            console: Some(ConsoleConfig { enabled: true }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if let Some(ref mut tg) = config.adapters.telegram {
                tg.token = Some(token);
                tg.enabled = true;
            }
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        if let Ok(path) = std::env::var("PLEXUS_DB") {
            config.database.path = Some(PathBuf::from(path));
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix must not be empty".into()));
        }
        // Room for at least "p:g:" plus a hashed component segment
        if self.components.custom_id_limit < 16 {
            return Err(ConfigError::InvalidValue(format!(
                "components.custom-id-limit too small: {}",
                self.components.custom_id_limit
            )));
        }
        Ok(())
    }

    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        !self.plugins.disabled.iter().any(|d| d == name)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
