//! Event dispatcher - routes inbound platform events to commands and the bus

use std::sync::Arc;

use super::commands::CommandRouter;
use super::events::EventBus;
use super::parser::MessageParser;
use crate::application::errors::BotError;
use crate::domain::entities::{Interaction, PlatformEvent};
use crate::domain::traits::{Platform, RegistrationScope};

pub struct EventDispatcher {
    router: CommandRouter,
    parser: MessageParser,
    bus: Arc<EventBus>,
    platform: Arc<dyn Platform>,
    /// Narrow command registration to this channel when set
    dev_channel: Option<String>,
}

impl EventDispatcher {
    pub fn new(
        router: CommandRouter,
        parser: MessageParser,
        bus: Arc<EventBus>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            router,
            parser,
            bus,
            platform,
            dev_channel: None,
        }
    }

    pub fn with_dev_channel(mut self, channel: Option<String>) -> Self {
        self.dev_channel = channel;
        self
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn registration_scope(&self) -> RegistrationScope {
        match &self.dev_channel {
            Some(channel) => RegistrationScope::Channel(channel.clone()),
            None => RegistrationScope::Global,
        }
    }

    /// Push every aggregated command to the platform in one call
    pub async fn register_commands(&self) -> Result<(), BotError> {
        let scope = self.registration_scope();
        let definitions = self.router.definitions();
        self.platform.register_commands(definitions, &scope).await?;
        tracing::info!(
            platform = %self.platform.name(),
            commands = definitions.len(),
            scope = ?scope,
            "Commands registered"
        );
        Ok(())
    }

    /// Handle one inbound event.
    ///
    /// Commands go to the router first; every event is then emitted on the
    /// bus. Returns the number of bus listeners that ran.
    pub async fn dispatch(&self, event: PlatformEvent) -> usize {
        match &event {
            PlatformEvent::Ready => {
                if let Err(e) = self.register_commands().await {
                    tracing::error!(error = %e, "Command registration failed");
                }
            }
            PlatformEvent::InteractionCreate(Interaction::Command(command)) => {
                // Failures are logged and answered inside the router
                let _ = self.router.dispatch(command.clone()).await;
            }
            PlatformEvent::MessageCreate(message) => {
                if let Some(command) = self.parser.parse(message, |name| self.router.is_group(name)) {
                    if self.router.contains(&command.name) {
                        let _ = self.router.dispatch(command).await;
                    } else {
                        tracing::debug!(command = %command.name, "Text command not registered");
                    }
                }
            }
            _ => {}
        }
        self.bus.emit(&event).await
    }
}
