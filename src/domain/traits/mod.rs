//! Domain traits - Abstractions for infrastructure implementations

pub mod platform;
pub mod plugin;

pub use platform::{Platform, RegistrationScope, Reply, DEFAULT_CUSTOM_ID_LIMIT};
pub use plugin::Plugin;
