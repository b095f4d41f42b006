//! Application layer errors

use thiserror::Error;

/// General runtime errors, the type every handler boundary speaks
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Unsupported by platform: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Wrap any displayable failure raised inside a handler
    pub fn handler(msg: impl std::fmt::Display) -> Self {
        BotError::Internal(msg.to_string())
    }
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Plugin resolution and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin '{0}' already registered")]
    Duplicate(String),

    #[error("Missing hard dependency '{dependency}' of plugin '{plugin}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Hard dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Dependency '{dependency}' of plugin '{plugin}' is not available")]
    DependencyUnavailable { plugin: String, dependency: String },

    #[error("Plugin '{0}' can only register during its init")]
    RegistrationClosed(String),

    #[error("Plugin init failed: {0}")]
    Init(String),

    #[error("Plugin panicked: {0}")]
    Panicked(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Query compilation and backend errors
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate key in {collection}: {detail}")]
    DuplicateKey { collection: String, detail: String },

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Record {0} kept changing during update")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Interactive component registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Invalid id segment {0:?}: must be non-empty and must not contain ':'")]
    InvalidId(String),

    #[error("Custom id for {plugin}:{group} cannot fit in {limit} characters")]
    IdTooLong {
        plugin: String,
        group: String,
        limit: usize,
    },

    #[error("Component group not found: {0}")]
    GroupNotFound(String),

    #[error("Group {0} is not message scoped")]
    NotMessageScoped(String),

    #[error("Group {0} has no components")]
    Empty(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = PluginError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Hard dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_query_error_converts_into_bot_error() {
        let err: BotError = QueryError::Unsupported("joins".into()).into();
        assert!(err.to_string().contains("joins"));
    }
}
