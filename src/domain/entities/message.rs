use super::User;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Well-known event names on the bus
pub mod event_names {
    pub const READY: &str = "ready";
    pub const MESSAGE_CREATE: &str = "messageCreate";
    pub const INTERACTION_CREATE: &str = "interactionCreate";
}

/// An ordinary chat message delivered by the platform
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub sender: Option<User>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            sender: None,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender(mut self, user: User) -> Self {
        self.sender = Some(user);
        self
    }
}

/// A slash command invocation
#[derive(Debug, Clone)]
pub struct CommandInteraction {
    pub id: String,
    pub channel_id: String,
    pub user: User,
    /// Top-level command name
    pub name: String,
    /// Invoked subcommand, for grouped commands
    pub subcommand: Option<String>,
    pub options: HashMap<String, Value>,
}

impl CommandInteraction {
    pub fn new(channel_id: impl Into<String>, user: User, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            user,
            name: name.into(),
            subcommand: None,
            options: HashMap::new(),
        }
    }

    pub fn with_subcommand(mut self, sub: impl Into<String>) -> Self {
        self.subcommand = Some(sub.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    pub fn option_i64(&self, name: &str) -> Option<i64> {
        self.options.get(name).and_then(Value::as_i64)
    }
}

/// A button press or select choice on a message
#[derive(Debug, Clone)]
pub struct ComponentInteraction {
    pub id: String,
    pub channel_id: String,
    pub message_id: String,
    pub user: User,
    pub custom_id: String,
    /// Selected values, empty for buttons
    pub values: Vec<String>,
}

impl ComponentInteraction {
    pub fn new(
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        user: User,
        custom_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            user,
            custom_id: custom_id.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }
}

/// A submitted modal dialog
#[derive(Debug, Clone)]
pub struct ModalSubmitInteraction {
    pub id: String,
    pub channel_id: String,
    pub user: User,
    pub custom_id: String,
    /// Text input id to submitted value
    pub fields: HashMap<String, String>,
}

impl ModalSubmitInteraction {
    pub fn new(channel_id: impl Into<String>, user: User, custom_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            user,
            custom_id: custom_id.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(id.into(), value.into());
        self
    }
}

/// Every kind of interaction the platform can deliver
#[derive(Debug, Clone)]
pub enum Interaction {
    Command(CommandInteraction),
    Component(ComponentInteraction),
    ModalSubmit(ModalSubmitInteraction),
}

impl Interaction {
    pub fn id(&self) -> &str {
        match self {
            Interaction::Command(i) => &i.id,
            Interaction::Component(i) => &i.id,
            Interaction::ModalSubmit(i) => &i.id,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Interaction::Command(i) => &i.channel_id,
            Interaction::Component(i) => &i.channel_id,
            Interaction::ModalSubmit(i) => &i.channel_id,
        }
    }
}

/// An inbound occurrence from the host platform
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Ready,
    MessageCreate(Message),
    InteractionCreate(Interaction),
    /// Anything else the adapter forwards verbatim
    Other { name: String, payload: Value },
}

impl PlatformEvent {
    pub fn name(&self) -> &str {
        match self {
            PlatformEvent::Ready => event_names::READY,
            PlatformEvent::MessageCreate(_) => event_names::MESSAGE_CREATE,
            PlatformEvent::InteractionCreate(_) => event_names::INTERACTION_CREATE,
            PlatformEvent::Other { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(PlatformEvent::Ready.name(), "ready");
        let other = PlatformEvent::Other {
            name: "guildMemberAdd".into(),
            payload: Value::Null,
        };
        assert_eq!(other.name(), "guildMemberAdd");
    }

    #[test]
    fn test_command_options() {
        let cmd = CommandInteraction::new("c1", User::new("u1"), "pay")
            .with_option("amount", 25)
            .with_option("to", "bob");
        assert_eq!(cmd.option_i64("amount"), Some(25));
        assert_eq!(cmd.option_str("to"), Some("bob"));
        assert_eq!(cmd.option_str("amount"), None);
    }
}
