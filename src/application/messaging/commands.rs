//! Command router - the name to handler map built once after loading

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::errors::CommandError;
use crate::application::plugins::{PluginContext, PluginRecord};
use crate::application::services::side_effects::{best_effort, run_isolated};
use crate::domain::entities::{Command, CommandDefinition, CommandHandler, CommandInteraction};
use crate::domain::traits::Reply;

/// Reply for a grouped command invoked with a subcommand it does not have
pub const UNKNOWN_SUBCOMMAND_REPLY: &str = "Unknown subcommand.";

/// Reply for any handler failure; details stay in the logs
pub const FAILURE_REPLY: &str = "Something went wrong while running this command.";

enum Target {
    Single(CommandHandler),
    /// Subcommand name to original handler
    Group(HashMap<String, CommandHandler>),
}

struct Route {
    owner: String,
    ctx: Arc<PluginContext>,
    target: Target,
}

/// Fold a plugin's commands into one grouped command.
///
/// Subcommands mirror the originals' names, descriptions and options.
/// Duplicate names inside the group keep the first.
fn fold(group: &str, description: &str, owner: &str, commands: &[Command]) -> (CommandDefinition, HashMap<String, CommandHandler>) {
    let mut handlers = HashMap::new();
    let mut subcommands = Vec::new();
    for command in commands {
        if handlers.contains_key(&command.name) {
            tracing::warn!(plugin = %owner, command = %command.name, "Duplicate subcommand dropped");
            continue;
        }
        handlers.insert(command.name.clone(), command.handler.clone());
        subcommands.push(command.definition());
    }
    let definition = CommandDefinition {
        name: group.to_string(),
        description: description.to_string(),
        options: Vec::new(),
        subcommands,
    };
    (definition, handlers)
}

#[derive(Default)]
pub struct CommandRouter {
    routes: HashMap<String, Route>,
    definitions: Vec<CommandDefinition>,
}

impl CommandRouter {
    /// Build from loaded plugins given in load order.
    ///
    /// On a name clash the plugin loaded first keeps the name.
    pub fn build<'a>(plugins: impl IntoIterator<Item = &'a PluginRecord>) -> Self {
        let mut router = Self::default();
        for record in plugins {
            let Some(ctx) = record.context.clone() else {
                continue;
            };
            let owner = record.manifest.name.clone();

            let entries: Vec<(CommandDefinition, Target)> = match &record.manifest.command_group {
                Some(group) if !record.commands.is_empty() => {
                    let description = record
                        .manifest
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("{} commands", owner));
                    let (definition, handlers) = fold(group, &description, &owner, &record.commands);
                    vec![(definition, Target::Group(handlers))]
                }
                _ => record
                    .commands
                    .iter()
                    .map(|c| (c.definition(), Target::Single(c.handler.clone())))
                    .collect(),
            };

            for (definition, target) in entries {
                if let Some(existing) = router.routes.get(&definition.name) {
                    tracing::warn!(
                        plugin = %owner,
                        command = %definition.name,
                        owner = %existing.owner,
                        "Command name already taken, dropped"
                    );
                    continue;
                }
                router.routes.insert(
                    definition.name.clone(),
                    Route {
                        owner: owner.clone(),
                        ctx: ctx.clone(),
                        target,
                    },
                );
                router.definitions.push(definition);
            }
        }
        tracing::info!(commands = router.definitions.len(), "Command router built");
        router
    }

    /// Definitions to push to the platform
    pub fn definitions(&self) -> &[CommandDefinition] {
        &self.definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Whether `name` is a folded command group
    pub fn is_group(&self, name: &str) -> bool {
        matches!(
            self.routes.get(name),
            Some(Route {
                target: Target::Group(_),
                ..
            })
        )
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|r| r.owner.as_str())
    }

    /// Run the handler for one invocation.
    ///
    /// Unknown names are logged and dropped. Handler failures are logged with
    /// the owning plugin and answered with a short private reply.
    pub async fn dispatch(&self, interaction: CommandInteraction) -> Result<(), CommandError> {
        let Some(route) = self.routes.get(&interaction.name) else {
            tracing::warn!(command = %interaction.name, "Unknown command dropped");
            return Err(CommandError::NotFound(interaction.name));
        };

        let handler = match &route.target {
            Target::Single(handler) => handler.clone(),
            Target::Group(handlers) => {
                let sub = interaction.subcommand.clone().unwrap_or_default();
                match handlers.get(&sub) {
                    Some(handler) => handler.clone(),
                    None => {
                        best_effort(
                            &route.owner,
                            "reply",
                            route.ctx.reply(&interaction, Reply::private(UNKNOWN_SUBCOMMAND_REPLY)),
                        )
                        .await;
                        return Err(CommandError::UnknownSubcommand(format!("{} {}", interaction.name, sub)));
                    }
                }
            }
        };

        let ctx = route.ctx.clone();
        let name = interaction.name.clone();
        let reply_to = interaction.clone();
        if let Err(e) = run_isolated(handler(interaction, ctx)).await {
            tracing::error!(plugin = %route.owner, command = %name, error = %e, "Command handler failed");
            best_effort(
                &route.owner,
                "reply",
                route.ctx.reply(&reply_to, Reply::private(FAILURE_REPLY)),
            )
            .await;
            return Err(CommandError::ExecutionFailed(name));
        }
        Ok(())
    }
}
