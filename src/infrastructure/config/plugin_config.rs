//! Per-plugin YAML config files
//!
//! Each plugin with non-null defaults owns `<dir>/<plugin>.yaml`. The file is
//! generated from the defaults on first run and re-read on every start.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::application::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct PluginConfigStore {
    dir: PathBuf,
}

impl PluginConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, plugin: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", plugin))
    }

    /// Load a plugin's validated config.
    ///
    /// Never fails: unreadable, unparsable or invalid files fall back to the
    /// defaults with a warning.
    pub fn load<F>(&self, plugin: &str, defaults: &Value, validate: F) -> Value
    where
        F: Fn(&Value) -> Result<(), String>,
    {
        if defaults.is_null() {
            return Value::Null;
        }
        let path = self.path_for(plugin);

        if !path.exists() {
            if let Err(e) = write_yaml(&path, defaults) {
                tracing::warn!(plugin = %plugin, error = %e, "Failed to write default config");
            } else {
                tracing::info!(plugin = %plugin, path = %path.display(), "Generated default config");
            }
            return defaults.clone();
        }

        let loaded = match read_yaml(&path) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(plugin = %plugin, error = %e, "Using default config");
                return defaults.clone();
            }
        };

        let merged = merge_defaults(loaded, defaults);
        match validate(&merged) {
            Ok(()) => merged,
            Err(reason) => {
                tracing::warn!(plugin = %plugin, reason = %reason, "Invalid config, using defaults");
                defaults.clone()
            }
        }
    }
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
}

fn write_yaml(path: &Path, value: &Value) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Fill keys missing from `loaded` with their defaults, recursing into maps
pub fn merge_defaults(loaded: Value, defaults: &Value) -> Value {
    match (loaded, defaults) {
        (Value::Object(mut map), Value::Object(def)) => {
            for (key, default) in def {
                let merged = match map.remove(key) {
                    Some(value) => merge_defaults(value, default),
                    None => default.clone(),
                };
                map.insert(key.clone(), merged);
            }
            Value::Object(map)
        }
        (Value::Null, defaults) => defaults.clone(),
        (loaded, _) => loaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn positive_limit(v: &Value) -> Result<(), String> {
        match v["limit"].as_i64() {
            Some(n) if n > 0 => Ok(()),
            _ => Err("limit must be positive".into()),
        }
    }

    #[test]
    fn test_first_run_generates_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        let defaults = json!({ "limit": 5 });

        assert_eq!(store.load("counter", &defaults, positive_limit), defaults);
        assert!(store.path_for("counter").exists());
    }

    #[test]
    fn test_existing_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        std::fs::write(store.path_for("counter"), "limit: 9\n").unwrap();

        let config = store.load("counter", &json!({ "limit": 5, "channel": "general" }), positive_limit);
        assert_eq!(config, json!({ "limit": 9, "channel": "general" }));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        std::fs::write(store.path_for("counter"), "limit: -1\n").unwrap();

        let defaults = json!({ "limit": 5 });
        assert_eq!(store.load("counter", &defaults, positive_limit), defaults);
    }

    #[test]
    fn test_null_defaults_skip_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        assert_eq!(store.load("bare", &Value::Null, |_| Ok(())), Value::Null);
        assert!(!store.path_for("bare").exists());
    }
}
