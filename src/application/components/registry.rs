//! Component registry - namespaced groups and callback dispatch
//!
//! Every plugin registers groups under its own namespace. Outgoing elements
//! carry `plugin:group:component` custom ids; incoming interactions are
//! decomposed back and routed either to a live message collector or, for
//! global groups, straight to the group handler.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::collector::{Collector, Collectors};
use super::descriptor::{ComponentEvent, GroupDescriptor, GroupKind, Scope, MODAL_ROOT};
use super::ids;
use crate::application::errors::{BotError, ComponentError};
use crate::application::messaging::events::{listener, EventBus, CORE_OWNER};
use crate::application::services::side_effects::run_isolated;
use crate::domain::entities::{event_names, ActionRow, Component, Interaction, Modal, PlatformEvent};
use crate::domain::traits::Platform;

/// Collector lifetime when a message-scoped group sets no timeout
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Concrete elements resolved from a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltGroup {
    Rows(Vec<ActionRow>),
    Modal(Modal),
}

/// Result of routing one interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// The group's filter rejected the interaction
    Filtered,
    /// The message collector is past its deadline or gone
    Expired,
    /// Not an id this registry knows; left for someone else
    Unmatched,
    /// The handler returned an error or panicked
    Failed,
}

type GroupKey = (String, String);

pub struct ComponentRegistry {
    groups: RwLock<HashMap<GroupKey, Arc<GroupDescriptor>>>,
    collectors: Collectors,
    platform: Arc<dyn Platform>,
    limit: usize,
}

impl ComponentRegistry {
    /// `limit` is capped by the platform's own custom id ceiling
    pub fn new(platform: Arc<dyn Platform>, limit: usize) -> Self {
        let limit = limit.min(platform.custom_id_limit());
        Self {
            groups: RwLock::new(HashMap::new()),
            collectors: Collectors::new(),
            platform,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<GroupKey, Arc<GroupDescriptor>>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<GroupKey, Arc<GroupDescriptor>>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or overwrite a group.
    ///
    /// Fails when the group is empty or one of its ids cannot be compiled
    /// within the ceiling, so `build` never fails for registered groups.
    pub fn register(&self, plugin: &str, group: &str, descriptor: GroupDescriptor) -> Result<(), ComponentError> {
        if descriptor.kind.is_empty() {
            return Err(ComponentError::Empty(format!("{}:{}", plugin, group)));
        }
        for local in descriptor.kind.local_ids() {
            ids::compile(plugin, group, local, self.limit)?;
        }
        let replaced = self
            .write()
            .insert((plugin.to_string(), group.to_string()), Arc::new(descriptor))
            .is_some();
        tracing::debug!(plugin = %plugin, group = %group, replaced, "Registered component group");
        Ok(())
    }

    /// Remove a group from lookup. Live collectors keep working.
    pub fn unregister(&self, plugin: &str, group: &str) -> bool {
        self.write()
            .remove(&(plugin.to_string(), group.to_string()))
            .is_some()
    }

    /// Drop every group owned by `plugin`
    pub fn remove_plugin(&self, plugin: &str) {
        self.write().retain(|(owner, _), _| owner != plugin);
    }

    pub fn get(&self, plugin: &str, group: &str) -> Option<Arc<GroupDescriptor>> {
        self.read().get(&(plugin.to_string(), group.to_string())).cloned()
    }

    fn descriptor(&self, plugin: &str, group: &str) -> Result<Arc<GroupDescriptor>, ComponentError> {
        self.get(plugin, group)
            .ok_or_else(|| ComponentError::GroupNotFound(format!("{}:{}", plugin, group)))
    }

    /// Resolve a group into concrete, fully namespaced elements
    pub fn build(&self, plugin: &str, group: &str) -> Result<BuiltGroup, ComponentError> {
        let descriptor = self.descriptor(plugin, group)?;
        self.resolve(plugin, group, &descriptor)
    }

    fn resolve(&self, plugin: &str, group: &str, descriptor: &GroupDescriptor) -> Result<BuiltGroup, ComponentError> {
        let id = |local: &str| ids::compile(plugin, group, local, self.limit);

        let built = match &descriptor.kind {
            GroupKind::Buttons(buttons) => {
                let mut components = Vec::with_capacity(buttons.len());
                for button in buttons {
                    components.push(Component::Button {
                        custom_id: id(&button.id)?,
                        label: button.label.clone(),
                        style: button.style,
                        disabled: false,
                    });
                }
                let rows = components
                    .chunks(ActionRow::MAX_BUTTONS)
                    .map(|chunk| ActionRow::new(chunk.to_vec()))
                    .collect();
                BuiltGroup::Rows(rows)
            }
            GroupKind::Select(selects) => {
                // Select menus take a full row each
                let mut rows = Vec::with_capacity(selects.len());
                for select in selects {
                    rows.push(ActionRow::new(vec![Component::SelectMenu {
                        custom_id: id(&select.id)?,
                        placeholder: select.placeholder.clone(),
                        options: select.options.clone(),
                        min_values: select.min_values,
                        max_values: select.max_values,
                        disabled: false,
                    }]));
                }
                BuiltGroup::Rows(rows)
            }
            GroupKind::Modal { title, inputs } => BuiltGroup::Modal(Modal {
                custom_id: id(MODAL_ROOT)?,
                title: title.clone(),
                // Text inputs keep their local ids as submitted field keys
                rows: inputs
                    .iter()
                    .map(|input| {
                        ActionRow::new(vec![Component::TextInput {
                            custom_id: input.id.clone(),
                            label: input.label.clone(),
                            style: input.style,
                            required: input.required,
                            placeholder: input.placeholder.clone(),
                            value: input.value.clone(),
                        }])
                    })
                    .collect(),
            }),
        };
        Ok(built)
    }

    /// Build a row group and send it; message-scoped groups get a collector
    pub async fn send(
        &self,
        plugin: &str,
        group: &str,
        channel_id: &str,
        text: &str,
    ) -> Result<String, BotError> {
        let descriptor = self.descriptor(plugin, group)?;
        let rows = match self.resolve(plugin, group, &descriptor)? {
            BuiltGroup::Rows(rows) => rows,
            BuiltGroup::Modal(_) => {
                return Err(BotError::Unsupported(format!(
                    "{}:{} is a modal; open it with show_modal",
                    plugin, group
                )))
            }
        };
        let message_id = self.platform.send_message(channel_id, text, &rows).await?;
        if descriptor.scope == Scope::Message {
            self.collect(plugin, group, &descriptor, channel_id, &message_id, rows);
        }
        Ok(message_id)
    }

    /// Open a modal group in response to an interaction
    pub async fn show_modal(&self, plugin: &str, group: &str, interaction_id: &str) -> Result<(), BotError> {
        match self.build(plugin, group)? {
            BuiltGroup::Modal(modal) => self.platform.show_modal(interaction_id, &modal).await,
            BuiltGroup::Rows(_) => Err(BotError::Unsupported(format!("{}:{} is not a modal", plugin, group))),
        }
    }

    /// Bind a message-scoped group to a message sent elsewhere
    pub fn attach(&self, plugin: &str, group: &str, channel_id: &str, message_id: &str) -> Result<(), ComponentError> {
        let descriptor = self.descriptor(plugin, group)?;
        if descriptor.scope != Scope::Message {
            return Err(ComponentError::NotMessageScoped(format!("{}:{}", plugin, group)));
        }
        let rows = match self.resolve(plugin, group, &descriptor)? {
            BuiltGroup::Rows(rows) => rows,
            BuiltGroup::Modal(_) => Vec::new(),
        };
        self.collect(plugin, group, &descriptor, channel_id, message_id, rows);
        Ok(())
    }

    fn collect(
        &self,
        plugin: &str,
        group: &str,
        descriptor: &Arc<GroupDescriptor>,
        channel_id: &str,
        message_id: &str,
        rows: Vec<ActionRow>,
    ) {
        let timeout = descriptor.timeout.unwrap_or(DEFAULT_COLLECTOR_TIMEOUT);
        self.collectors.attach(
            Collector {
                plugin: plugin.to_string(),
                group: group.to_string(),
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                deadline: Instant::now() + timeout,
                descriptor: descriptor.clone(),
                rows,
            },
            self.platform.clone(),
        );
    }

    /// Map a possibly hashed custom id back to the element's local id
    fn local_id(&self, plugin: &str, group: &str, descriptor: &GroupDescriptor, custom_id: &str) -> Option<String> {
        descriptor
            .kind
            .local_ids()
            .into_iter()
            .find(|local| ids::compile(plugin, group, local, self.limit).is_ok_and(|id| id == custom_id))
            .map(str::to_string)
    }

    /// Route one inbound interaction
    pub async fn dispatch(&self, interaction: &Interaction) -> Dispatch {
        let (custom_id, message_id) = match interaction {
            Interaction::Component(i) => (i.custom_id.as_str(), Some(i.message_id.as_str())),
            Interaction::ModalSubmit(i) => (i.custom_id.as_str(), None),
            Interaction::Command(_) => return Dispatch::Unmatched,
        };
        let Some(parsed) = ids::parse(custom_id) else {
            return Dispatch::Unmatched;
        };

        // A collector on the message takes precedence over global lookup
        let collector = message_id
            .and_then(|id| self.collectors.get(id))
            .filter(|c| c.plugin == parsed.plugin && c.group == parsed.group);

        let descriptor = match collector {
            Some(collector) if collector.is_expired() => return Dispatch::Expired,
            Some(collector) => collector.descriptor.clone(),
            None => match self.get(parsed.plugin, parsed.group) {
                Some(d) if d.scope == Scope::Global => d,
                // Message-scoped group without a live collector
                Some(_) => return Dispatch::Expired,
                None => return Dispatch::Unmatched,
            },
        };

        let Some(component) = self.local_id(parsed.plugin, parsed.group, &descriptor, custom_id) else {
            return Dispatch::Unmatched;
        };

        let event = ComponentEvent {
            plugin: parsed.plugin.to_string(),
            group: parsed.group.to_string(),
            component,
            interaction: interaction.clone(),
        };
        if !descriptor.accepts(&event) {
            return Dispatch::Filtered;
        }

        let handler = descriptor.handler.clone();
        let plugin = event.plugin.clone();
        let group = event.group.clone();
        match run_isolated(async move { handler(event).await }).await {
            Ok(()) => Dispatch::Handled,
            Err(e) => {
                tracing::error!(plugin = %plugin, group = %group, error = %e, "Component handler failed");
                Dispatch::Failed
            }
        }
    }

    /// Subscribe the global dispatcher to interaction events on `bus`
    pub fn install(self: &Arc<Self>, bus: &EventBus) {
        let registry = Arc::clone(self);
        bus.subscribe(
            CORE_OWNER,
            event_names::INTERACTION_CREATE,
            false,
            listener(move |event| {
                let registry = registry.clone();
                async move {
                    if let PlatformEvent::InteractionCreate(interaction) = event {
                        registry.dispatch(&interaction).await;
                    }
                    Ok(())
                }
            }),
        );
    }

    pub fn active_collectors(&self) -> usize {
        self.collectors.len()
    }

    pub fn shutdown(&self) {
        self.collectors.abort_all();
    }
}

/// A plugin's view of the registry, locked to its own namespace
#[derive(Clone)]
pub struct PluginComponents {
    plugin: String,
    registry: Arc<ComponentRegistry>,
}

impl PluginComponents {
    pub fn new(plugin: impl Into<String>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            plugin: plugin.into(),
            registry,
        }
    }

    pub fn register(&self, group: &str, descriptor: GroupDescriptor) -> Result<(), ComponentError> {
        self.registry.register(&self.plugin, group, descriptor)
    }

    pub fn unregister(&self, group: &str) -> bool {
        self.registry.unregister(&self.plugin, group)
    }

    pub fn build(&self, group: &str) -> Result<BuiltGroup, ComponentError> {
        self.registry.build(&self.plugin, group)
    }

    pub async fn send(&self, group: &str, channel_id: &str, text: &str) -> Result<String, BotError> {
        self.registry.send(&self.plugin, group, channel_id, text).await
    }

    pub async fn show_modal(&self, group: &str, interaction_id: &str) -> Result<(), BotError> {
        self.registry.show_modal(&self.plugin, group, interaction_id).await
    }

    pub fn attach(&self, group: &str, channel_id: &str, message_id: &str) -> Result<(), ComponentError> {
        self.registry.attach(&self.plugin, group, channel_id, message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::components::descriptor::{ButtonSpec, SelectSpec, TextInputSpec};
    use crate::domain::entities::{CommandDefinition, SelectOption};
    use crate::domain::traits::{RegistrationScope, Reply};
    use async_trait::async_trait;

    struct NullPlatform;

    #[async_trait]
    impl Platform for NullPlatform {
        fn name(&self) -> &str {
            "null"
        }

        fn custom_id_limit(&self) -> usize {
            64
        }

        async fn register_commands(&self, _: &[CommandDefinition], _: &RegistrationScope) -> Result<(), BotError> {
            Ok(())
        }

        async fn send_message(&self, _: &str, _: &str, _: &[ActionRow]) -> Result<String, BotError> {
            Ok("m1".into())
        }

        async fn edit_components(&self, _: &str, _: &str, _: &[ActionRow]) -> Result<(), BotError> {
            Ok(())
        }

        async fn reply(&self, _: &str, _: &str, _: &Reply) -> Result<(), BotError> {
            Ok(())
        }

        async fn show_modal(&self, _: &str, _: &Modal) -> Result<(), BotError> {
            Ok(())
        }
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(Arc::new(NullPlatform), 100)
    }

    #[test]
    fn test_limit_follows_platform() {
        assert_eq!(registry().limit(), 64);
    }

    #[test]
    fn test_buttons_wrap_at_five_per_row() {
        let reg = registry();
        let buttons = (0..7).map(|i| ButtonSpec::new(format!("b{i}"), format!("B{i}"))).collect();
        reg.register("shop", "pager", GroupDescriptor::buttons(buttons, |_| async { Ok(()) }))
            .unwrap();

        let BuiltGroup::Rows(rows) = reg.build("shop", "pager").unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].components.len(), 5);
        assert_eq!(rows[1].components[1].custom_id(), "shop:pager:b6");
    }

    #[test]
    fn test_selects_take_a_row_each() {
        let reg = registry();
        let options = vec![SelectOption::new("Red", "red")];
        let selects = vec![SelectSpec::new("color", options.clone()), SelectSpec::new("shade", options)];
        reg.register("paint", "pick", GroupDescriptor::select(selects, |_| async { Ok(()) }))
            .unwrap();

        let BuiltGroup::Rows(rows) = reg.build("paint", "pick").unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_modal_root_is_namespaced_inputs_are_not() {
        let reg = registry();
        let inputs = vec![TextInputSpec::new("reason", "Reason").paragraph()];
        reg.register("tickets", "open", GroupDescriptor::modal("Open ticket", inputs, |_| async { Ok(()) }))
            .unwrap();

        let BuiltGroup::Modal(modal) = reg.build("tickets", "open").unwrap() else {
            panic!("expected modal");
        };
        assert_eq!(modal.custom_id, "tickets:open:modal");
        assert_eq!(modal.rows[0].components[0].custom_id(), "reason");
    }

    #[test]
    fn test_registration_rejects_empty_and_unfittable_groups() {
        let reg = registry();
        let empty = GroupDescriptor::buttons(Vec::new(), |_| async { Ok(()) });
        assert!(matches!(reg.register("p", "g", empty), Err(ComponentError::Empty(_))));

        let group = "g".repeat(60);
        let too_long = GroupDescriptor::buttons(vec![ButtonSpec::new("ok", "OK")], |_| async { Ok(()) });
        assert!(matches!(
            reg.register("p", &group, too_long),
            Err(ComponentError::IdTooLong { .. })
        ));
    }

    #[test]
    fn test_unregister_removes_from_lookup() {
        let reg = registry();
        reg.register("p", "g", GroupDescriptor::buttons(vec![ButtonSpec::new("ok", "OK")], |_| async { Ok(()) }))
            .unwrap();
        assert!(reg.unregister("p", "g"));
        assert!(matches!(reg.build("p", "g"), Err(ComponentError::GroupNotFound(_))));
    }
}
