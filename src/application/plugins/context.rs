//! Plugin context - the capability surface handed to each plugin

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::logger::PluginLogger;
use crate::application::components::{ComponentRegistry, PluginComponents};
use crate::application::errors::{BotError, PluginError, QueryError};
use crate::application::messaging::events::{EventBus, EventRegistration};
use crate::application::services::Scheduler;
use crate::domain::entities::{Command, CommandInteraction, Manifest, PlatformEvent};
use crate::domain::traits::{Platform, Reply};
use crate::infrastructure::database::{Backend, TableSchema};
use crate::infrastructure::query::Query;
use crate::infrastructure::repository::Repository;

/// Core services shared by every context
#[derive(Clone)]
pub struct CoreServices {
    pub backend: Arc<dyn Backend>,
    pub platform: Arc<dyn Platform>,
    pub bus: Arc<EventBus>,
    pub components: Arc<ComponentRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub locator: Arc<ServiceLocator>,
}

type Api = Arc<dyn Any + Send + Sync>;

/// Capability objects exposed by loaded plugins
#[derive(Default)]
pub struct ServiceLocator {
    apis: RwLock<HashMap<String, Api>>,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, plugin: &str, api: Api) {
        self.apis
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(plugin.to_string(), api);
    }

    /// The api exposed by `plugin`, if it exposed one of type `T`
    pub fn get<T: Any + Send + Sync>(&self, plugin: &str) -> Option<Arc<T>> {
        let api = self
            .apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin)
            .cloned()?;
        api.downcast::<T>().ok()
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(plugin)
    }
}

/// What a plugin registered during one init attempt
#[derive(Default)]
pub struct Registrations {
    pub commands: Vec<Command>,
    pub events: Vec<EventRegistration>,
    pub api: Option<Api>,
}

/// Per-plugin context; one instance per plugin for the process lifetime
pub struct PluginContext {
    manifest: Manifest,
    config: Value,
    logger: PluginLogger,
    services: CoreServices,
    /// Open only while the plugin's init runs
    window: Mutex<Option<Registrations>>,
}

impl PluginContext {
    pub fn new(manifest: Manifest, config: Value, services: CoreServices) -> Self {
        let logger = PluginLogger::new(manifest.name.clone());
        Self {
            manifest,
            config,
            logger,
            services,
            window: Mutex::new(None),
        }
    }

    fn window(&self) -> MutexGuard<'_, Option<Registrations>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn open_registration(&self) {
        *self.window() = Some(Registrations::default());
    }

    /// Close the window and hand back everything registered through it
    pub(crate) fn close_registration(&self) -> Registrations {
        self.window().take().unwrap_or_default()
    }

    fn register<F>(&self, f: F) -> Result<(), PluginError>
    where
        F: FnOnce(&mut Registrations),
    {
        match self.window().as_mut() {
            Some(registrations) => {
                f(registrations);
                Ok(())
            }
            None => Err(PluginError::RegistrationClosed(self.manifest.name.clone())),
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Validated config snapshot
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, BotError> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| BotError::Parse(format!("{} config: {}", self.name(), e)))
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    pub fn register_command(&self, command: Command) -> Result<(), PluginError> {
        self.register(|r| r.commands.push(command))
    }

    pub fn register_event<F, Fut>(&self, event: &str, handler: F) -> Result<(), PluginError>
    where
        F: Fn(PlatformEvent, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let registration = EventRegistration::new(event, false, handler);
        self.register(|r| r.events.push(registration))
    }

    /// Like `register_event`, removed after its first invocation
    pub fn register_event_once<F, Fut>(&self, event: &str, handler: F) -> Result<(), PluginError>
    where
        F: Fn(PlatformEvent, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let registration = EventRegistration::new(event, true, handler);
        self.register(|r| r.events.push(registration))
    }

    /// Publish a capability object for other plugins.
    ///
    /// Visible through `get_plugin` once this plugin's init succeeds.
    pub fn expose<T: Any + Send + Sync>(&self, api: T) -> Result<(), PluginError> {
        self.register(|r| r.api = Some(Arc::new(api)))
    }

    /// Api exposed by another loaded plugin
    pub fn get_plugin<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.services.locator.get::<T>(name)
    }

    /// Namespaced table or collection name
    pub fn table(&self, name: &str) -> String {
        format!("{}_{}", self.manifest.storage_prefix(), name)
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.services.backend.clone()
    }

    /// Start a query on one of this plugin's tables
    pub fn query(&self, name: &str) -> Query {
        Query::on(self.backend(), self.table(name))
    }

    pub fn repository<T>(&self, name: &str) -> Repository<T>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        Repository::new(self.backend(), self.table(name))
    }

    /// Create one of this plugin's tables if needed; the schema name is namespaced
    pub async fn ensure_table(&self, schema: TableSchema) -> Result<(), QueryError> {
        let schema = TableSchema {
            name: self.table(&schema.name),
            ..schema
        };
        self.services.backend.ensure_schema(&schema).await
    }

    pub fn components(&self) -> PluginComponents {
        PluginComponents::new(self.name(), self.services.components.clone())
    }

    /// Periodic task under `plugin:id`; rescheduling the same id replaces it
    pub fn schedule<F, Fut>(&self, id: &str, every: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let key = format!("{}:{}", self.name(), id);
        self.services.scheduler.schedule(self.name(), &key, every, task);
    }

    pub fn cancel_schedule(&self, id: &str) -> bool {
        self.services.scheduler.cancel(&format!("{}:{}", self.name(), id))
    }

    pub fn platform(&self) -> Arc<dyn Platform> {
        self.services.platform.clone()
    }

    /// Answer a command interaction
    pub async fn reply(&self, interaction: &CommandInteraction, reply: Reply) -> Result<(), BotError> {
        self.services
            .platform
            .reply(&interaction.channel_id, &interaction.id, &reply)
            .await
    }

    /// Emit a custom event to every subscribed plugin
    pub async fn emit(&self, event: &str, payload: Value) -> usize {
        self.services
            .bus
            .emit(&PlatformEvent::Other {
                name: event.to_string(),
                payload,
            })
            .await
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.manifest.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
