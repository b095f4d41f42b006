//! General plugin - liveness and greeting commands, plus a clock other plugins can read

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::application::errors::PluginError;
use crate::application::plugins::PluginContext;
use crate::domain::entities::{Command, CommandOption, Manifest, OptionKind};
use crate::domain::traits::{Plugin, Reply};

pub const NAME: &str = "general";

/// Api exposed to other plugins
#[derive(Debug, Clone)]
pub struct GeneralApi {
    pub started_at: DateTime<Utc>,
}

impl GeneralApi {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[derive(Debug, Deserialize)]
struct GeneralConfig {
    greeting: String,
}

pub struct GeneralPlugin;

fn format_uptime(uptime: chrono::Duration) -> String {
    let secs = uptime.num_seconds().max(0);
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[async_trait]
impl Plugin for GeneralPlugin {
    fn manifest(&self) -> Manifest {
        Manifest::new(NAME, env!("CARGO_PKG_VERSION")).with_description("General commands")
    }

    fn config_defaults(&self) -> Value {
        json!({ "greeting": "Hello" })
    }

    fn validate_config(&self, config: &Value) -> Result<(), String> {
        match config.get("greeting").and_then(Value::as_str) {
            Some(g) if !g.trim().is_empty() => Ok(()),
            _ => Err("greeting must be a non-empty string".to_string()),
        }
    }

    async fn init(&self, ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        let config: GeneralConfig = ctx
            .config_as()
            .map_err(|e| PluginError::Init(e.to_string()))?;
        let api = GeneralApi {
            started_at: Utc::now(),
        };

        ctx.register_command(
            Command::new("ping", |interaction, ctx| async move {
                ctx.reply(&interaction, Reply::new("Pong!")).await
            })
            .with_description("Check the bot is alive"),
        )?;

        let greeting = config.greeting;
        ctx.register_command(
            Command::new("hello", move |interaction, ctx| {
                let greeting = greeting.clone();
                async move {
                    let name = interaction
                        .option_str("name")
                        .map(str::to_string)
                        .unwrap_or_else(|| interaction.user.display_name());
                    ctx.reply(&interaction, Reply::new(format!("{}, {}!", greeting, name)))
                        .await
                }
            })
            .with_description("Say hello")
            .with_option(CommandOption::new("name", "Who to greet", OptionKind::String)),
        )?;

        let clock = api.clone();
        ctx.register_command(
            Command::new("uptime", move |interaction, ctx| {
                let uptime = clock.uptime();
                async move {
                    ctx.reply(&interaction, Reply::new(format!("Up for {}", format_uptime(uptime))))
                        .await
                }
            })
            .with_description("Show how long the bot has been running"),
        )?;

        ctx.expose(api)?;
        ctx.logger().info("General commands ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(chrono::Duration::seconds(3725)), "1h 2m 5s");
        assert_eq!(format_uptime(chrono::Duration::seconds(-4)), "0h 0m 0s");
    }

    #[test]
    fn test_validate_config() {
        let plugin = GeneralPlugin;
        assert!(plugin.validate_config(&plugin.config_defaults()).is_ok());
        assert!(plugin.validate_config(&json!({ "greeting": " " })).is_err());
        assert!(plugin.validate_config(&json!({ "greeting": 3 })).is_err());
    }
}
