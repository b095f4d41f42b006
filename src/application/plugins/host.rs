//! Lifecycle host - loads plugins in dependency order and isolates failures

use std::sync::Arc;

use super::context::{CoreServices, PluginContext};
use super::resolver::{resolve, Resolution};
use crate::application::errors::PluginError;
use crate::application::messaging::events::EventRegistration;
use crate::application::services::side_effects::run_isolated;
use crate::domain::entities::{Command, Manifest};
use crate::domain::traits::Plugin;
use crate::infrastructure::config::PluginConfigStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Failed { reason: String },
}

impl PluginState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, PluginState::Loaded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PluginState::Failed { .. })
    }
}

/// One discovered plugin and everything its init registered
pub struct PluginRecord {
    pub manifest: Manifest,
    pub state: PluginState,
    pub context: Option<Arc<PluginContext>>,
    pub commands: Vec<Command>,
    pub events: Vec<EventRegistration>,
    plugin: Arc<dyn Plugin>,
}

impl PluginRecord {
    fn fail(&mut self, reason: impl Into<String>) {
        self.state = PluginState::Failed {
            reason: reason.into(),
        };
        self.context = None;
        self.commands.clear();
        self.events.clear();
    }
}

/// Summary of one load pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct PluginHost {
    services: CoreServices,
    config_store: Option<PluginConfigStore>,
    records: Vec<PluginRecord>,
    /// Indices into `records`, in the order plugins loaded
    load_order: Vec<usize>,
}

impl PluginHost {
    pub fn new(services: CoreServices) -> Self {
        Self {
            services,
            config_store: None,
            records: Vec::new(),
            load_order: Vec::new(),
        }
    }

    /// Read per-plugin config files from `store`; without one, plugins get their defaults
    pub fn with_config_store(mut self, store: PluginConfigStore) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Add a plugin; discovery order is the registration order
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let manifest = plugin.manifest();
        tracing::debug!(plugin = %manifest.name, version = %manifest.version, "Discovered plugin");
        self.records.push(PluginRecord {
            manifest,
            state: PluginState::Unloaded,
            context: None,
            commands: Vec::new(),
            events: Vec::new(),
            plugin,
        });
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.manifest.name == name)
    }

    /// Resolve and load every registered plugin once
    pub async fn load_all(&mut self) -> LoadReport {
        let manifests: Vec<Manifest> = self.records.iter().map(|r| r.manifest.clone()).collect();
        let Resolution { order, failures } = resolve(&manifests);

        for (name, err) in failures {
            if let PluginError::Duplicate(_) = err {
                // The first record under this name is the one that loads
                for record in self.records.iter_mut().filter(|r| r.manifest.name == name).skip(1) {
                    record.fail(err.to_string());
                }
                tracing::error!(plugin = %name, error = %err, "Duplicate plugin ignored");
                continue;
            }
            if let Some(idx) = self.index_of(&name) {
                tracing::error!(plugin = %name, error = %err, "Plugin cannot be loaded");
                self.records[idx].fail(err.to_string());
            }
        }

        for name in order {
            let Some(idx) = self.index_of(&name) else {
                continue;
            };
            self.load_one(idx).await;
        }

        let mut report = LoadReport::default();
        for &idx in &self.load_order {
            report.loaded.push(self.records[idx].manifest.name.clone());
        }
        for record in &self.records {
            if let PluginState::Failed { reason } = &record.state {
                report.failed.push((record.manifest.name.clone(), reason.clone()));
            }
        }
        tracing::info!(loaded = report.loaded.len(), failed = report.failed.len(), "Plugins loaded");
        report
    }

    async fn load_one(&mut self, idx: usize) {
        let manifest = self.records[idx].manifest.clone();
        let name = manifest.name.clone();

        // A hard dependency that failed its own init takes its dependents down
        let unavailable = manifest.dependencies.hard.iter().find(|dep| {
            self.index_of(dep)
                .map_or(true, |d| !self.records[d].state.is_loaded())
        });
        if let Some(dep) = unavailable {
            let err = PluginError::DependencyUnavailable {
                plugin: name.clone(),
                dependency: dep.clone(),
            };
            tracing::error!(plugin = %name, error = %err, "Plugin cannot be loaded");
            self.records[idx].fail(err.to_string());
            return;
        }

        self.records[idx].state = PluginState::Loading;
        let plugin = self.records[idx].plugin.clone();

        let defaults = plugin.config_defaults();
        let config = match &self.config_store {
            Some(store) => store.load(&name, &defaults, |value| plugin.validate_config(value)),
            None => defaults,
        };

        let ctx = Arc::new(PluginContext::new(manifest, config, self.services.clone()));
        ctx.open_registration();
        let outcome = run_isolated(plugin.init(ctx.clone())).await;
        let registrations = ctx.close_registration();

        match outcome {
            Ok(()) => {
                for event in &registrations.events {
                    self.services
                        .bus
                        .subscribe(&name, &event.event, event.once, event.bind(ctx.clone()));
                }
                if let Some(api) = registrations.api {
                    self.services.locator.publish(&name, api);
                }
                let record = &mut self.records[idx];
                record.commands = registrations.commands;
                record.events = registrations.events;
                record.context = Some(ctx);
                record.state = PluginState::Loaded;
                self.load_order.push(idx);
                tracing::info!(
                    plugin = %name,
                    commands = record.commands.len(),
                    events = record.events.len(),
                    "Plugin loaded"
                );
            }
            Err(reason) => {
                // Discard everything the failed attempt left behind
                drop(registrations);
                self.services.components.remove_plugin(&name);
                self.services.scheduler.cancel_owner(&name);
                tracing::error!(plugin = %name, error = %reason, "Plugin init failed");
                self.records[idx].fail(PluginError::Init(reason).to_string());
            }
        }
    }

    /// Every discovered plugin, in discovery order
    pub fn records(&self) -> &[PluginRecord] {
        &self.records
    }

    pub fn record(&self, name: &str) -> Option<&PluginRecord> {
        self.records.iter().find(|r| r.manifest.name == name)
    }

    pub fn state(&self, name: &str) -> Option<&PluginState> {
        self.record(name).map(|r| &r.state)
    }

    /// Loaded plugins in load order
    pub fn loaded(&self) -> impl Iterator<Item = &PluginRecord> {
        self.load_order.iter().map(|&idx| &self.records[idx])
    }

    pub fn services(&self) -> &CoreServices {
        &self.services
    }

    /// Call every loaded plugin's shutdown hook, last loaded first
    pub async fn shutdown(&self) {
        for &idx in self.load_order.iter().rev() {
            let record = &self.records[idx];
            if let Err(e) = run_isolated(record.plugin.shutdown()).await {
                tracing::warn!(plugin = %record.manifest.name, error = %e, "Plugin shutdown failed");
            }
        }
    }
}
