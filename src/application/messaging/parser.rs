//! Message parser - turns prefixed text messages into command invocations

use serde_json::Value;

use crate::domain::entities::{CommandInteraction, Message, User};

/// Option key holding the positional arguments, joined by single spaces
pub const ARGS_OPTION: &str = "args";

/// Parses `<prefix>name [sub] [key=value ...] [args ...]`
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Parse a text message.
    ///
    /// `is_group` tells whether a command name is a folded group, in which
    /// case the next token is taken as the subcommand. Returns `None` for
    /// messages that are not commands.
    pub fn parse(&self, message: &Message, is_group: impl Fn(&str) -> bool) -> Option<CommandInteraction> {
        let text = message.text.trim();
        let body = text.strip_prefix(self.command_prefix.as_str())?;

        let mut tokens = body.split_whitespace();
        let mut name = tokens.next()?;
        // Telegram-style `/cmd@botname`
        if let Some((head, _)) = name.split_once('@') {
            name = head;
        }
        if name.is_empty() {
            return None;
        }

        let user = message.sender.clone().unwrap_or_else(|| User::new("unknown"));
        let mut interaction = CommandInteraction::new(&message.channel_id, user, name);
        interaction.id = message.id.clone();

        if is_group(name) {
            if let Some(sub) = tokens.next() {
                interaction = interaction.with_subcommand(sub);
            }
        }

        let mut positional = Vec::new();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    interaction.options.insert(key.to_string(), option_value(value));
                }
                _ => positional.push(token),
            }
        }
        if !positional.is_empty() {
            interaction = interaction.with_option(ARGS_OPTION, positional.join(" "));
        }

        Some(interaction)
    }
}

/// Integers and booleans keep their type, everything else stays text
fn option_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Message {
        Message::new("c1", text).with_sender(User::new("u1"))
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        let parser = MessageParser::new("/");
        assert!(parser.parse(&msg("hello there"), |_| false).is_none());
        assert!(parser.parse(&msg("/"), |_| false).is_none());
    }

    #[test]
    fn test_command_with_arguments() {
        let parser = MessageParser::new("!");
        let cmd = parser
            .parse(&msg("!pay amount=25 to=bob thanks for lunch"), |_| false)
            .unwrap();
        assert_eq!(cmd.name, "pay");
        assert_eq!(cmd.subcommand, None);
        assert_eq!(cmd.option_i64("amount"), Some(25));
        assert_eq!(cmd.option_str("to"), Some("bob"));
        assert_eq!(cmd.option_str(ARGS_OPTION), Some("thanks for lunch"));
        assert_eq!(cmd.user.id, "u1");
    }

    #[test]
    fn test_group_takes_subcommand() {
        let parser = MessageParser::new("/");
        let cmd = parser
            .parse(&msg("/eco balance"), |name| name == "eco")
            .unwrap();
        assert_eq!(cmd.name, "eco");
        assert_eq!(cmd.subcommand.as_deref(), Some("balance"));

        let cmd = parser.parse(&msg("/ping extra"), |name| name == "eco").unwrap();
        assert_eq!(cmd.subcommand, None);
        assert_eq!(cmd.option_str(ARGS_OPTION), Some("extra"));
    }

    #[test]
    fn test_bot_suffix_is_stripped() {
        let parser = MessageParser::new("/");
        let cmd = parser.parse(&msg("/ping@plexus_bot"), |_| false).unwrap();
        assert_eq!(cmd.name, "ping");
    }
}
