use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::entities::{ActionRow, CommandDefinition, Modal};

/// Default ceiling for a component custom id
pub const DEFAULT_CUSTOM_ID_LIMIT: usize = 100;

/// Where aggregated commands are registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationScope {
    /// Narrow registration to one channel/guild, visible immediately
    Channel(String),
    /// Broad registration, may take a while to propagate
    Global,
}

/// Reply to an interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// Only visible to the invoking user
    pub ephemeral: bool,
    pub components: Vec<ActionRow>,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
            components: Vec::new(),
        }
    }

    /// Short privately visible reply
    pub fn private(content: impl Into<String>) -> Self {
        Self {
            ephemeral: true,
            ..Self::new(content)
        }
    }

    pub fn with_components(mut self, components: Vec<ActionRow>) -> Self {
        self.components = components;
        self
    }
}

/// Platform trait - outbound calls to the host chat platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &str;

    /// Maximum length of a component custom id on this platform
    fn custom_id_limit(&self) -> usize {
        DEFAULT_CUSTOM_ID_LIMIT
    }

    /// Push the command set to the platform's registration endpoint
    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
        scope: &RegistrationScope,
    ) -> Result<(), BotError>;

    /// Send a message, returns the platform message id
    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
        components: &[ActionRow],
    ) -> Result<String, BotError>;

    /// Replace the interactive elements of an existing message
    async fn edit_components(
        &self,
        channel_id: &str,
        message_id: &str,
        components: &[ActionRow],
    ) -> Result<(), BotError>;

    /// Answer an interaction
    async fn reply(
        &self,
        channel_id: &str,
        interaction_id: &str,
        reply: &Reply,
    ) -> Result<(), BotError>;

    /// Open a modal in response to an interaction
    async fn show_modal(&self, interaction_id: &str, modal: &Modal) -> Result<(), BotError>;
}
