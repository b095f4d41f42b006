//! plexus - a plugin-hosting chat bot core
//!
//! Plugins declare a manifest with hard and soft dependencies, register
//! commands, event handlers and interactive components during init, and
//! store data through a backend-neutral query DSL.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{BotError, PluginError};
pub use application::Runtime;
pub use domain::traits::{Platform, Plugin};
