//! Plugin system - dependency resolution, contexts and the lifecycle host

pub mod context;
pub mod host;
pub mod logger;
pub mod resolver;

pub use context::{CoreServices, PluginContext, Registrations, ServiceLocator};
pub use host::{LoadReport, PluginHost, PluginRecord, PluginState};
pub use logger::PluginLogger;
pub use resolver::{resolve, Resolution};
