//! Concrete interactive elements as sent to the platform

use serde::{Deserialize, Serialize};

/// Visual style of a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
    Link,
}

/// One option inside a select menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Text input style inside a modal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputStyle {
    #[default]
    Short,
    Paragraph,
}

/// A concrete element carrying its fully namespaced custom id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Button {
        custom_id: String,
        label: String,
        style: ButtonStyle,
        disabled: bool,
    },
    SelectMenu {
        custom_id: String,
        placeholder: Option<String>,
        options: Vec<SelectOption>,
        min_values: u8,
        max_values: u8,
        disabled: bool,
    },
    TextInput {
        custom_id: String,
        label: String,
        style: TextInputStyle,
        required: bool,
        placeholder: Option<String>,
        value: Option<String>,
    },
}

impl Component {
    pub fn custom_id(&self) -> &str {
        match self {
            Component::Button { custom_id, .. }
            | Component::SelectMenu { custom_id, .. }
            | Component::TextInput { custom_id, .. } => custom_id,
        }
    }

    /// Copy of this element that no longer accepts interaction
    pub fn disabled(&self) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Component::Button { disabled, .. } | Component::SelectMenu { disabled, .. } => {
                *disabled = true
            }
            Component::TextInput { .. } => {}
        }
        copy
    }

    pub fn is_disabled(&self) -> bool {
        match self {
            Component::Button { disabled, .. } | Component::SelectMenu { disabled, .. } => {
                *disabled
            }
            Component::TextInput { .. } => false,
        }
    }
}

/// A horizontal row of elements
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionRow {
    pub components: Vec<Component>,
}

impl ActionRow {
    /// Maximum number of buttons sharing one row
    pub const MAX_BUTTONS: usize = 5;

    pub fn new(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn disabled(&self) -> Self {
        Self {
            components: self.components.iter().map(Component::disabled).collect(),
        }
    }
}

/// A modal dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub rows: Vec<ActionRow>,
}
