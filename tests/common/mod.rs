//! Shared test doubles
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use plexus::application::errors::{BotError, PluginError};
use plexus::application::plugins::PluginContext;
use plexus::domain::entities::{ActionRow, CommandDefinition, Manifest, Modal};
use plexus::domain::traits::{Platform, Plugin, RegistrationScope, Reply};
use plexus::infrastructure::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
    pub text: String,
    pub rows: Vec<ActionRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentReply {
    pub channel_id: String,
    pub interaction_id: String,
    pub reply: Reply,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub channel_id: String,
    pub message_id: String,
    pub rows: Vec<ActionRow>,
}

/// In-memory platform that records every outbound call
pub struct RecordingPlatform {
    limit: usize,
    next_id: AtomicU64,
    pub registrations: Mutex<Vec<(Vec<CommandDefinition>, RegistrationScope)>>,
    pub messages: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<Edit>>,
    pub replies: Mutex<Vec<SentReply>>,
    pub modals: Mutex<Vec<Modal>>,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Self::with_limit(100)
    }

    pub fn with_limit(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            next_id: AtomicU64::new(1),
            registrations: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            modals: Mutex::new(Vec::new()),
        })
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn reply_texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.reply.content).collect()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn custom_id_limit(&self) -> usize {
        self.limit
    }

    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
        scope: &RegistrationScope,
    ) -> Result<(), BotError> {
        self.registrations
            .lock()
            .unwrap()
            .push((commands.to_vec(), scope.clone()));
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
        components: &[ActionRow],
    ) -> Result<String, BotError> {
        let id = format!("m{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.messages.lock().unwrap().push(SentMessage {
            id: id.clone(),
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            rows: components.to_vec(),
        });
        Ok(id)
    }

    async fn edit_components(
        &self,
        channel_id: &str,
        message_id: &str,
        components: &[ActionRow],
    ) -> Result<(), BotError> {
        self.edits.lock().unwrap().push(Edit {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            rows: components.to_vec(),
        });
        Ok(())
    }

    async fn reply(
        &self,
        channel_id: &str,
        interaction_id: &str,
        reply: &Reply,
    ) -> Result<(), BotError> {
        self.replies.lock().unwrap().push(SentReply {
            channel_id: channel_id.to_string(),
            interaction_id: interaction_id.to_string(),
            reply: reply.clone(),
        });
        Ok(())
    }

    async fn show_modal(&self, _interaction_id: &str, modal: &Modal) -> Result<(), BotError> {
        self.modals.lock().unwrap().push(modal.clone());
        Ok(())
    }
}

type InitFn =
    Arc<dyn Fn(Arc<PluginContext>) -> BoxFuture<'static, Result<(), PluginError>> + Send + Sync>;

/// Plugin assembled from a manifest and an init closure
pub struct TestPlugin {
    manifest: Manifest,
    defaults: Value,
    init: InitFn,
}

impl TestPlugin {
    pub fn new<F, Fut>(manifest: Manifest, init: F) -> Arc<dyn Plugin>
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        Arc::new(Self {
            manifest,
            defaults: Value::Null,
            init: Arc::new(move |ctx| init(ctx).boxed()),
        })
    }

    /// Plugin whose init registers nothing
    pub fn empty(manifest: Manifest) -> Arc<dyn Plugin> {
        Self::new(manifest, |_| async { Ok(()) })
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn manifest(&self) -> Manifest {
        self.manifest.clone()
    }

    fn config_defaults(&self) -> Value {
        self.defaults.clone()
    }

    async fn init(&self, ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        (self.init)(ctx).await
    }
}

/// Route library logs to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with in-memory storage and plugin configs under `dir`
pub fn test_config(dir: &std::path::Path) -> Config {
    init_tracing();
    let mut config = Config::default();
    config.plugins.config_dir = dir.to_path_buf();
    config.database.path = None;
    config
}
