//! Telegram adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::application::errors::BotError;
use crate::domain::entities::{
    self, ActionRow, CommandDefinition, Component, ComponentInteraction, Interaction, Modal,
    PlatformEvent,
};
use crate::domain::traits::{Platform, RegistrationScope, Reply};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Callback data is capped at 64 bytes; select options append `#<index>`
pub const CUSTOM_ID_LIMIT: usize = 60;

const OPTION_MARK: char = '#';

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&User> for entities::User {
    fn from(user: &User) -> Self {
        let name = match (&user.first_name, &user.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, last) => last.clone(),
        };
        entities::User {
            id: user.id.to_string(),
            username: user.username.clone(),
            name,
            is_bot: user.is_bot,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Deserialize)]
struct Response<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct BotCommand {
    command: String,
    description: String,
}

/// Telegram platform adapter
pub struct TelegramAdapter {
    token: String,
    client: Client,
    /// Select values keyed by the select's custom id
    selects: Mutex<HashMap<String, Vec<String>>>,
    /// Callback queries not answered yet
    pending_callbacks: Mutex<HashSet<String>>,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: Client::new(),
            selects: Mutex::new(HashMap::new()),
            pending_callbacks: Mutex::new(HashSet::new()),
        }
    }

    fn selects(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.selects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_callbacks(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending_callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, BotError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let status = response.status();
        let data: Response<T> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        if !data.ok {
            return Err(BotError::Network(format!(
                "Telegram API error on {} ({}): {}",
                method,
                status,
                data.description.unwrap_or_default()
            )));
        }
        data.result
            .ok_or_else(|| BotError::Parse(format!("{}: empty result", method)))
    }

    /// Check the token and return the bot's username
    pub async fn get_me(&self) -> Result<String, BotError> {
        let me: User = self.call("getMe", &json!({})).await?;
        Ok(me.username.unwrap_or_else(|| me.id.to_string()))
    }

    /// Long-poll for updates
    pub async fn get_updates(&self, offset: i64, timeout: i64) -> Result<Vec<Update>, BotError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    /// Get the next update offset
    pub fn next_offset(updates: &[Update], current: i64) -> i64 {
        updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(current)
    }

    /// Translate one update into a platform event
    pub fn to_event(&self, update: &Update) -> Option<PlatformEvent> {
        if let Some(message) = &update.message {
            let text = message.text.clone()?;
            let mut out = entities::Message::new(message.chat.id.to_string(), text)
                .with_id(message.message_id.to_string());
            if let Some(from) = &message.from {
                out = out.with_sender(from.into());
            }
            return Some(PlatformEvent::MessageCreate(out));
        }

        let query = update.callback_query.as_ref()?;
        let data = query.data.as_deref()?;
        let message = query.message.as_ref()?;

        let (custom_id, values) = match data.rsplit_once(OPTION_MARK) {
            Some((id, index)) => {
                let value = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.selects().get(id).and_then(|v| v.get(i).cloned()));
                match value {
                    Some(value) => (id.to_string(), vec![value]),
                    None => (data.to_string(), Vec::new()),
                }
            }
            None => (data.to_string(), Vec::new()),
        };

        self.pending_callbacks().insert(query.id.clone());
        let mut interaction = ComponentInteraction::new(
            message.chat.id.to_string(),
            message.message_id.to_string(),
            (&query.from).into(),
            custom_id,
        )
        .with_values(values);
        interaction.id = query.id.clone();
        Some(PlatformEvent::InteractionCreate(Interaction::Component(interaction)))
    }

    /// Render rows as an inline keyboard; select options become one button each
    fn inline_keyboard(&self, rows: &[ActionRow]) -> Vec<Vec<InlineKeyboardButton>> {
        let mut keyboard = Vec::new();
        for row in rows {
            let mut buttons = Vec::new();
            for component in row.components.iter().filter(|c| !c.is_disabled()) {
                match component {
                    Component::Button {
                        custom_id, label, ..
                    } => buttons.push(InlineKeyboardButton {
                        text: label.clone(),
                        callback_data: custom_id.clone(),
                    }),
                    Component::SelectMenu {
                        custom_id, options, ..
                    } => {
                        self.selects().insert(
                            custom_id.clone(),
                            options.iter().map(|o| o.value.clone()).collect(),
                        );
                        buttons.extend(options.iter().enumerate().map(|(i, o)| {
                            InlineKeyboardButton {
                                text: o.label.clone(),
                                callback_data: format!("{}{}{}", custom_id, OPTION_MARK, i),
                            }
                        }));
                    }
                    Component::TextInput { .. } => {}
                }
            }
            if !buttons.is_empty() {
                keyboard.push(buttons);
            }
        }
        keyboard
    }

    /// Commands as Telegram sees them; groups list their subcommands in the description
    fn bot_commands(commands: &[CommandDefinition]) -> Vec<BotCommand> {
        commands
            .iter()
            .map(|c| {
                let mut description = if c.description.is_empty() {
                    c.name.clone()
                } else {
                    c.description.clone()
                };
                if !c.subcommands.is_empty() {
                    let subs: Vec<&str> = c.subcommands.iter().map(|s| s.name.as_str()).collect();
                    description = format!("{} ({})", description, subs.join(", "));
                }
                BotCommand {
                    command: c.name.to_lowercase(),
                    description,
                }
            })
            .collect()
    }

    fn scope_json(scope: &RegistrationScope) -> Value {
        match scope {
            RegistrationScope::Channel(chat_id) => json!({ "type": "chat", "chat_id": chat_id }),
            RegistrationScope::Global => json!({ "type": "default" }),
        }
    }

    fn reply_markup(&self, components: &[ActionRow]) -> Value {
        json!({ "inline_keyboard": self.inline_keyboard(components) })
    }
}

#[async_trait]
impl Platform for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    fn custom_id_limit(&self) -> usize {
        CUSTOM_ID_LIMIT
    }

    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
        scope: &RegistrationScope,
    ) -> Result<(), BotError> {
        let body = json!({
            "commands": Self::bot_commands(commands),
            "scope": Self::scope_json(scope),
        });
        let _: bool = self.call("setMyCommands", &body).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
        components: &[ActionRow],
    ) -> Result<String, BotError> {
        let mut body = json!({ "chat_id": channel_id, "text": text });
        if !components.is_empty() {
            body["reply_markup"] = self.reply_markup(components);
        }
        let message: Message = self.call("sendMessage", &body).await?;
        Ok(message.message_id.to_string())
    }

    async fn edit_components(
        &self,
        channel_id: &str,
        message_id: &str,
        components: &[ActionRow],
    ) -> Result<(), BotError> {
        let body = json!({
            "chat_id": channel_id,
            "message_id": message_id,
            "reply_markup": self.reply_markup(components),
        });
        let _: Value = self.call("editMessageReplyMarkup", &body).await?;
        Ok(())
    }

    async fn reply(
        &self,
        channel_id: &str,
        interaction_id: &str,
        reply: &Reply,
    ) -> Result<(), BotError> {
        let is_callback = self.pending_callbacks().remove(interaction_id);
        if is_callback && reply.ephemeral && reply.components.is_empty() {
            let body = json!({
                "callback_query_id": interaction_id,
                "text": reply.content,
                "show_alert": true,
            });
            let _: bool = self.call("answerCallbackQuery", &body).await?;
            return Ok(());
        }
        if is_callback {
            let _: bool = self
                .call("answerCallbackQuery", &json!({ "callback_query_id": interaction_id }))
                .await?;
        }

        let mut body = json!({ "chat_id": channel_id, "text": reply.content });
        if !is_callback {
            if let Ok(message_id) = interaction_id.parse::<i64>() {
                body["reply_to_message_id"] = json!(message_id);
            }
        }
        if !reply.components.is_empty() {
            body["reply_markup"] = self.reply_markup(&reply.components);
        }
        let _: Message = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn show_modal(&self, _interaction_id: &str, modal: &Modal) -> Result<(), BotError> {
        Err(BotError::Unsupported(format!(
            "telegram has no modal dialogs ({})",
            modal.custom_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ButtonStyle, SelectOption};

    fn update(json: Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_text_message_becomes_message_create() {
        let adapter = TelegramAdapter::new("t");
        let event = adapter.to_event(&update(json!({
            "update_id": 7,
            "message": {
                "message_id": 11,
                "from": { "id": 5, "username": "alice" },
                "chat": { "id": -100 },
                "text": "/eco balance"
            }
        })));

        match event {
            Some(PlatformEvent::MessageCreate(m)) => {
                assert_eq!(m.id, "11");
                assert_eq!(m.channel_id, "-100");
                assert_eq!(m.text, "/eco balance");
                assert_eq!(m.sender.unwrap().display_name(), "alice");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_select_option_round_trip() {
        let adapter = TelegramAdapter::new("t");
        let rows = vec![ActionRow::new(vec![Component::SelectMenu {
            custom_id: "shop:pick:item".into(),
            placeholder: None,
            options: vec![SelectOption::new("Sword", "sword"), SelectOption::new("Shield", "shield")],
            min_values: 1,
            max_values: 1,
            disabled: false,
        }])];
        let keyboard = adapter.inline_keyboard(&rows);
        assert_eq!(keyboard[0][1].callback_data, "shop:pick:item#1");

        let event = adapter.to_event(&update(json!({
            "update_id": 8,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 5 },
                "message": { "message_id": 12, "chat": { "id": 3 } },
                "data": "shop:pick:item#1"
            }
        })));
        match event {
            Some(PlatformEvent::InteractionCreate(Interaction::Component(c))) => {
                assert_eq!(c.custom_id, "shop:pick:item");
                assert_eq!(c.values, vec!["shield".to_string()]);
                assert_eq!(c.message_id, "12");
                assert_eq!(c.id, "cb1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_disabled_buttons_are_hidden() {
        let adapter = TelegramAdapter::new("t");
        let button = Component::Button {
            custom_id: "p:g:yes".into(),
            label: "Yes".into(),
            style: ButtonStyle::Primary,
            disabled: false,
        };
        let rows = vec![ActionRow::new(vec![button]).disabled()];
        assert!(adapter.inline_keyboard(&rows).is_empty());
    }

    #[test]
    fn test_bot_commands_flatten_groups() {
        let group = CommandDefinition {
            name: "eco".into(),
            description: "Economy".into(),
            options: Vec::new(),
            subcommands: vec![CommandDefinition {
                name: "balance".into(),
                description: String::new(),
                options: Vec::new(),
                subcommands: Vec::new(),
            }],
        };
        let commands = TelegramAdapter::bot_commands(&[group]);
        assert_eq!(commands[0].command, "eco");
        assert_eq!(commands[0].description, "Economy (balance)");
        assert_eq!(
            TelegramAdapter::scope_json(&RegistrationScope::Channel("42".into())),
            json!({ "type": "chat", "chat_id": "42" })
        );
    }

    #[test]
    fn test_next_offset() {
        let updates = vec![update(json!({ "update_id": 3 })), update(json!({ "update_id": 9 }))];
        assert_eq!(TelegramAdapter::next_offset(&updates, 0), 10);
        assert_eq!(TelegramAdapter::next_offset(&[], 4), 4);
    }
}
