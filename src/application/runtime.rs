//! Runtime - wires core services, loads plugins and feeds events through

use std::sync::Arc;

use crate::application::components::ComponentRegistry;
use crate::application::errors::BotError;
use crate::application::messaging::{CommandRouter, EventBus, EventDispatcher, MessageParser};
use crate::application::plugins::{CoreServices, LoadReport, PluginHost, ServiceLocator};
use crate::application::services::Scheduler;
use crate::domain::entities::PlatformEvent;
use crate::domain::traits::{Platform, Plugin};
use crate::infrastructure::config::{Config, PluginConfigStore};
use crate::infrastructure::database;

pub struct Runtime {
    config: Config,
    host: PluginHost,
    dispatcher: Option<EventDispatcher>,
}

impl Runtime {
    /// Build core services for one platform and register the given plugins.
    ///
    /// Plugins listed under `plugins.disabled` are skipped.
    pub fn new(
        config: Config,
        platform: Arc<dyn Platform>,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Result<Self, BotError> {
        let backend = database::open(config.database.backend, config.database.path.as_deref())?;
        let bus = Arc::new(EventBus::new());

        let limit = config
            .components
            .custom_id_limit
            .min(platform.custom_id_limit());
        let components = Arc::new(ComponentRegistry::new(platform.clone(), limit));
        components.install(&bus);

        let services = CoreServices {
            backend,
            platform,
            bus,
            components,
            scheduler: Arc::new(Scheduler::new()),
            locator: Arc::new(ServiceLocator::new()),
        };

        let mut host = PluginHost::new(services)
            .with_config_store(PluginConfigStore::new(config.plugins.config_dir.clone()));
        for plugin in plugins {
            let name = plugin.manifest().name;
            if !config.is_plugin_enabled(&name) {
                tracing::info!(plugin = %name, "Plugin disabled by config");
                continue;
            }
            host.register(plugin);
        }

        Ok(Self {
            config,
            host,
            dispatcher: None,
        })
    }

    /// Load every plugin and build the command router from what loaded
    pub async fn start(&mut self) -> LoadReport {
        let report = self.host.load_all().await;

        let services = self.host.services();
        let router = CommandRouter::build(self.host.loaded());
        let dispatcher = EventDispatcher::new(
            router,
            MessageParser::new(self.config.bot.prefix.clone()),
            services.bus.clone(),
            services.platform.clone(),
        )
        .with_dev_channel(self.config.bot.dev_channel.clone());
        self.dispatcher = Some(dispatcher);

        report
    }

    /// Feed one inbound event; events before `start` are dropped
    pub async fn handle(&self, event: PlatformEvent) -> usize {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(event).await,
            None => {
                tracing::warn!(event = %event.name(), "Event before start dropped");
                0
            }
        }
    }

    pub fn host(&self) -> &PluginHost {
        &self.host
    }

    pub fn services(&self) -> &CoreServices {
        self.host.services()
    }

    pub fn dispatcher(&self) -> Option<&EventDispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop periodic tasks and collectors, then shut plugins down in reverse load order
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down");
        let services = self.host.services();
        services.scheduler.shutdown();
        services.components.shutdown();
        self.host.shutdown().await;
    }
}
