//! Plugin manifest definition

use serde::{Deserialize, Serialize};

/// Static plugin identity plus dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    /// Plugin name, unique across the process
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub dependencies: Dependencies,

    /// When set, every command of the plugin is folded into one top-level
    /// command with this name
    #[serde(default)]
    pub command_group: Option<String>,
}

/// Declared dependencies of a plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dependencies {
    /// Must be loaded first; absence prevents loading
    #[serde(default)]
    pub hard: Vec<String>,

    /// Loaded first when present; absence never blocks
    #[serde(default)]
    pub soft: Vec<String>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            dependencies: Dependencies::default(),
            command_group: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_hard_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.hard.push(name.into());
        self
    }

    pub fn with_soft_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.soft.push(name.into());
        self
    }

    pub fn with_command_group(mut self, group: impl Into<String>) -> Self {
        self.command_group = Some(group.into());
        self
    }

    /// Prefix used to namespace the plugin's tables and collections.
    ///
    /// Anything outside `[a-z0-9_]` collapses to `_` so the prefix is always
    /// a valid identifier fragment.
    pub fn storage_prefix(&self) -> String {
        let mut prefix: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if prefix.starts_with(|c: char| c.is_ascii_digit()) {
            prefix.insert(0, 'p');
        }
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_from_yaml() {
        let yaml = r#"
name: economy
version: 1.2.0
dependencies:
  hard: [core]
  soft: [logging]
command-group: eco
"#;
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.name, "economy");
        assert_eq!(manifest.dependencies.hard, vec!["core"]);
        assert_eq!(manifest.dependencies.soft, vec!["logging"]);
        assert_eq!(manifest.command_group.as_deref(), Some("eco"));
    }

    #[test]
    fn test_dependencies_default_to_empty() {
        let manifest: Manifest = serde_yaml::from_str("name: a\nversion: '1'").unwrap();
        assert!(manifest.dependencies.hard.is_empty());
        assert!(manifest.dependencies.soft.is_empty());
    }

    #[test]
    fn test_storage_prefix_is_identifier_safe() {
        assert_eq!(Manifest::new("Level-Up", "1").storage_prefix(), "level_up");
        assert_eq!(Manifest::new("2fa", "1").storage_prefix(), "p2fa");
    }
}
