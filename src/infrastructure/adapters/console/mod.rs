//! Console adapter for development/testing
//!
//! Lines typed on stdin become message events. `:click <message> <custom-id> [values...]`
//! simulates pressing an element of a previously printed message.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::application::errors::BotError;
use crate::domain::entities::{
    ActionRow, CommandDefinition, Component, ComponentInteraction, Interaction, Message, Modal,
    PlatformEvent, User,
};
use crate::domain::traits::{Platform, RegistrationScope, Reply};

pub const CONSOLE_CHANNEL: &str = "console";

const CLICK: &str = ":click";

/// Console platform adapter for local development
pub struct ConsoleAdapter {
    user: User,
    next_message: AtomicU64,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self {
            user: User::new("console").with_username("you"),
            next_message: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> String {
        self.next_message.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Stdin line reader for [`ConsoleAdapter::read_event`]
    pub fn stdin_lines() -> Lines<BufReader<Stdin>> {
        BufReader::new(tokio::io::stdin()).lines()
    }

    /// Next inbound event; `None` once stdin is closed
    pub async fn read_event(&self, lines: &mut Lines<BufReader<Stdin>>) -> Option<PlatformEvent> {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    return None;
                }
            };
            if let Some(event) = self.parse_line(&line) {
                return Some(event);
            }
        }
    }

    /// Translate one typed line; blank lines yield nothing
    pub fn parse_line(&self, line: &str) -> Option<PlatformEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix(CLICK) {
            let mut parts = rest.split_whitespace();
            let (Some(message_id), Some(custom_id)) = (parts.next(), parts.next()) else {
                println!("usage: {} <message-id> <custom-id> [values...]", CLICK);
                return None;
            };
            let interaction = ComponentInteraction::new(
                CONSOLE_CHANNEL,
                message_id,
                self.user.clone(),
                custom_id,
            )
            .with_values(parts.map(str::to_string).collect());
            return Some(PlatformEvent::InteractionCreate(Interaction::Component(interaction)));
        }

        let message = Message::new(CONSOLE_CHANNEL, line)
            .with_id(self.next_id())
            .with_sender(self.user.clone());
        Some(PlatformEvent::MessageCreate(message))
    }

    fn print_rows(rows: &[ActionRow]) {
        for row in rows {
            let items: Vec<String> = row
                .components
                .iter()
                .map(|c| match c {
                    Component::Button {
                        custom_id,
                        label,
                        disabled,
                        ..
                    } => format!("[{}{}] {}", label, if *disabled { " (off)" } else { "" }, custom_id),
                    Component::SelectMenu {
                        custom_id, options, ..
                    } => {
                        let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
                        format!("<{}> {}", values.join("|"), custom_id)
                    }
                    Component::TextInput { custom_id, label, .. } => format!("{}: {}", label, custom_id),
                })
                .collect();
            println!("  {}", items.join("  "));
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for ConsoleAdapter {
    fn name(&self) -> &str {
        "console"
    }

    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
        scope: &RegistrationScope,
    ) -> Result<(), BotError> {
        let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
        println!("[commands {:?}] {}", scope, names.join(", "));
        Ok(())
    }

    async fn send_message(
        &self,
        _channel_id: &str,
        text: &str,
        components: &[ActionRow],
    ) -> Result<String, BotError> {
        let id = self.next_id();
        println!("[BOT #{}] {}", id, text);
        Self::print_rows(components);
        Ok(id)
    }

    async fn edit_components(
        &self,
        _channel_id: &str,
        message_id: &str,
        components: &[ActionRow],
    ) -> Result<(), BotError> {
        println!("[BOT #{} edited]", message_id);
        Self::print_rows(components);
        Ok(())
    }

    async fn reply(
        &self,
        _channel_id: &str,
        _interaction_id: &str,
        reply: &Reply,
    ) -> Result<(), BotError> {
        let marker = if reply.ephemeral { " (private)" } else { "" };
        println!("[BOT{}] {}", marker, reply.content);
        Self::print_rows(&reply.components);
        Ok(())
    }

    async fn show_modal(&self, _interaction_id: &str, modal: &Modal) -> Result<(), BotError> {
        println!("[MODAL {}] {}", modal.custom_id, modal.title);
        Self::print_rows(&modal.rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let adapter = ConsoleAdapter::new();
        assert!(adapter.parse_line("   ").is_none());

        match adapter.parse_line("/ping") {
            Some(PlatformEvent::MessageCreate(m)) => {
                assert_eq!(m.text, "/ping");
                assert_eq!(m.channel_id, CONSOLE_CHANNEL);
            }
            other => panic!("unexpected {:?}", other),
        }

        match adapter.parse_line(":click 4 shop:pick:item sword") {
            Some(PlatformEvent::InteractionCreate(Interaction::Component(c))) => {
                assert_eq!(c.message_id, "4");
                assert_eq!(c.custom_id, "shop:pick:item");
                assert_eq!(c.values, vec!["sword".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(adapter.parse_line(":click 4").is_none());
    }
}
