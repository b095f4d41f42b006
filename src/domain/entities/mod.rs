//! Domain entities - Core business objects

pub mod command;
pub mod component;
pub mod manifest;
pub mod message;
pub mod user;

pub use command::{Command, CommandDefinition, CommandHandler, CommandOption, OptionKind};
pub use component::{ActionRow, ButtonStyle, Component, Modal, SelectOption, TextInputStyle};
pub use manifest::{Dependencies, Manifest};
pub use message::{
    event_names, CommandInteraction, ComponentInteraction, Interaction, Message,
    ModalSubmitInteraction, PlatformEvent,
};
pub use user::User;
