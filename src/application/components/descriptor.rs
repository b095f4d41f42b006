//! Group descriptors: what a plugin registers before anything is sent

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::application::errors::BotError;
use crate::domain::entities::{ButtonStyle, Interaction, SelectOption, TextInputStyle, User};

/// Routing scope of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Bound to one sent message through a collector with a deadline
    Message,
    /// Handled by the process-wide listener for as long as it is registered
    #[default]
    Global,
}

/// What a handler receives when one of its elements fires
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub plugin: String,
    pub group: String,
    /// Local id of the element as declared in the group
    pub component: String,
    pub interaction: Interaction,
}

impl ComponentEvent {
    pub fn user(&self) -> &User {
        match &self.interaction {
            Interaction::Command(i) => &i.user,
            Interaction::Component(i) => &i.user,
            Interaction::ModalSubmit(i) => &i.user,
        }
    }

    pub fn channel_id(&self) -> &str {
        self.interaction.channel_id()
    }

    /// Selected values of a select menu, empty otherwise
    pub fn values(&self) -> &[String] {
        match &self.interaction {
            Interaction::Component(i) => &i.values,
            _ => &[],
        }
    }

    /// Submitted modal fields keyed by text input id
    pub fn fields(&self) -> Option<&HashMap<String, String>> {
        match &self.interaction {
            Interaction::ModalSubmit(i) => Some(&i.fields),
            _ => None,
        }
    }
}

pub type ComponentHandler =
    Arc<dyn Fn(ComponentEvent) -> BoxFuture<'static, Result<(), BotError>> + Send + Sync>;

pub type ComponentFilter = Arc<dyn Fn(&ComponentEvent) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    pub id: String,
    pub label: String,
    pub style: ButtonStyle,
}

impl ButtonSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style: ButtonStyle::Primary,
        }
    }

    pub fn with_style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectSpec {
    pub id: String,
    pub placeholder: Option<String>,
    pub options: Vec<SelectOption>,
    pub min_values: u8,
    pub max_values: u8,
}

impl SelectSpec {
    pub fn new(id: impl Into<String>, options: Vec<SelectOption>) -> Self {
        Self {
            id: id.into(),
            placeholder: None,
            options,
            min_values: 1,
            max_values: 1,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_range(mut self, min: u8, max: u8) -> Self {
        self.min_values = min;
        self.max_values = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInputSpec {
    pub id: String,
    pub label: String,
    pub style: TextInputStyle,
    pub required: bool,
    pub placeholder: Option<String>,
    pub value: Option<String>,
}

impl TextInputSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style: TextInputStyle::Short,
            required: true,
            placeholder: None,
            value: None,
        }
    }

    pub fn paragraph(mut self) -> Self {
        self.style = TextInputStyle::Paragraph;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Local id of a modal's root element
pub const MODAL_ROOT: &str = "modal";

/// The element set of a group; the variant is fixed at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    Buttons(Vec<ButtonSpec>),
    Select(Vec<SelectSpec>),
    Modal {
        title: String,
        inputs: Vec<TextInputSpec>,
    },
}

impl GroupKind {
    /// Local ids of every element that can fire an interaction
    pub fn local_ids(&self) -> Vec<&str> {
        match self {
            GroupKind::Buttons(buttons) => buttons.iter().map(|b| b.id.as_str()).collect(),
            GroupKind::Select(selects) => selects.iter().map(|s| s.id.as_str()).collect(),
            GroupKind::Modal { .. } => vec![MODAL_ROOT],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GroupKind::Buttons(buttons) => buttons.is_empty(),
            GroupKind::Select(selects) => selects.is_empty(),
            GroupKind::Modal { inputs, .. } => inputs.is_empty(),
        }
    }
}

/// A registered group of interactive elements sharing one handler
#[derive(Clone)]
pub struct GroupDescriptor {
    pub kind: GroupKind,
    pub scope: Scope,
    /// Collector lifetime for message-scoped groups
    pub timeout: Option<Duration>,
    /// Swap elements for disabled copies when the collector expires
    pub auto_disable: bool,
    pub filter: Option<ComponentFilter>,
    pub handler: ComponentHandler,
}

impl GroupDescriptor {
    fn with_kind<F, Fut>(kind: GroupKind, handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        Self {
            kind,
            scope: Scope::Global,
            timeout: None,
            auto_disable: false,
            filter: None,
            handler: Arc::new(move |event| handler(event).boxed()),
        }
    }

    pub fn buttons<F, Fut>(buttons: Vec<ButtonSpec>, handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        Self::with_kind(GroupKind::Buttons(buttons), handler)
    }

    pub fn select<F, Fut>(selects: Vec<SelectSpec>, handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        Self::with_kind(GroupKind::Select(selects), handler)
    }

    pub fn modal<F, Fut>(title: impl Into<String>, inputs: Vec<TextInputSpec>, handler: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        Self::with_kind(
            GroupKind::Modal {
                title: title.into(),
                inputs,
            },
            handler,
        )
    }

    /// Route through a per-message collector that lives for `timeout`
    pub fn message_scoped(mut self, timeout: Duration) -> Self {
        self.scope = Scope::Message;
        self.timeout = Some(timeout);
        self
    }

    pub fn auto_disable(mut self) -> Self {
        self.auto_disable = true;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ComponentEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn accepts(&self, event: &ComponentEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }
}

impl std::fmt::Debug for GroupDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupDescriptor")
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("auto_disable", &self.auto_disable)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}
