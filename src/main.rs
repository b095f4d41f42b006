use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use plexus::application::errors::{BotError, ConfigError};
use plexus::application::Runtime;
use plexus::domain::entities::PlatformEvent;
use plexus::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter};
use plexus::infrastructure::config::Config;
use plexus::plugins;

/// How long teardown may take before the process exits anyway
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Long-poll timeout for Telegram updates, in seconds
const POLL_TIMEOUT: i64 = 30;

#[derive(Parser)]
#[command(name = "plexus")]
#[command(about = "A plugin-hosting chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(&cli.config, cli.token);
            init_logging(&config.logging.level);
            if let Err(e) = run_bot(config) {
                tracing::error!(error = %e, "Bot stopped with an error");
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("plexus v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => match Config::default().to_yaml() {
            Ok(yaml) => {
                println!("{}", yaml);
                println!("\nSave this to config.yaml and adjust as needed.");
            }
            Err(e) => {
                eprintln!("Failed to render config: {}", e);
                std::process::exit(1);
            }
        },
    }
}

/// `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

fn load_config(path: &str, token_override: Option<String>) -> Config {
    let mut config = if Path::new(path).exists() {
        Config::load(path).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };

    if let Some(token) = token_override {
        let telegram = config
            .adapters
            .telegram
            .get_or_insert_with(Default::default);
        telegram.token = Some(token);
        telegram.enabled = true;
    }
    config
}

fn telegram_token(config: &Config) -> Option<String> {
    config
        .adapters
        .telegram
        .as_ref()
        .filter(|t| t.enabled)
        .and_then(|t| t.token.clone())
}

fn console_enabled(config: &Config) -> bool {
    config.adapters.console.as_ref().map_or(true, |c| c.enabled)
}

fn run_bot(config: Config) -> Result<(), BotError> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| BotError::Internal(e.to_string()))?;

    rt.block_on(async move {
        tracing::info!(name = %config.bot.name, "Starting plexus");

        let runtime = match telegram_token(&config) {
            Some(token) => {
                let adapter = Arc::new(TelegramAdapter::new(token));
                let username = adapter.get_me().await?;
                tracing::info!(bot = %username, "Telegram bot authenticated");

                let mut runtime = Runtime::new(config, adapter.clone(), plugins::builtin())?;
                runtime.start().await;
                runtime.handle(PlatformEvent::Ready).await;
                run_telegram(&runtime, &adapter).await;
                runtime
            }
            None if console_enabled(&config) => {
                let adapter = Arc::new(ConsoleAdapter::new());
                let mut runtime = Runtime::new(config, adapter.clone(), plugins::builtin())?;
                runtime.start().await;
                runtime.handle(PlatformEvent::Ready).await;
                run_console(&runtime, &adapter).await;
                runtime
            }
            None => {
                return Err(ConfigError::InvalidValue("no adapter enabled".into()).into());
            }
        };

        shutdown(&runtime).await;
        Ok(())
    })
}

async fn run_telegram(runtime: &Runtime, adapter: &TelegramAdapter) {
    let mut offset = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                return;
            }
            updates = adapter.get_updates(offset, POLL_TIMEOUT) => match updates {
                Ok(updates) => {
                    offset = TelegramAdapter::next_offset(&updates, offset);
                    for update in &updates {
                        if let Some(event) = adapter.to_event(update) {
                            runtime.handle(event).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Polling failed, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

async fn run_console(runtime: &Runtime, adapter: &ConsoleAdapter) {
    println!("plexus console - type {}ping, or :click <message> <custom-id>", runtime.config().bot.prefix);
    let mut lines = ConsoleAdapter::stdin_lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                return;
            }
            event = adapter.read_event(&mut lines) => match event {
                Some(event) => {
                    runtime.handle(event).await;
                }
                None => return,
            }
        }
    }
}

/// Teardown with a deadline; a second interrupt exits at once
async fn shutdown(runtime: &Runtime) {
    tokio::select! {
        _ = runtime.shutdown() => {
            tracing::info!("Shutdown complete");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Second interrupt, exiting now");
            std::process::exit(130);
        }
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Shutdown took too long, exiting");
            std::process::exit(1);
        }
    }
}
