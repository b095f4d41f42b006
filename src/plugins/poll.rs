//! Poll plugin - yes/no polls with message-scoped buttons and persisted votes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::application::components::{ButtonSpec, ComponentEvent, GroupDescriptor};
use crate::application::errors::{BotError, PluginError};
use crate::application::messaging::parser::ARGS_OPTION;
use crate::application::plugins::PluginContext;
use crate::application::services::best_effort;
use crate::domain::entities::{ButtonStyle, Command, CommandOption, Interaction, Manifest, OptionKind};
use crate::domain::traits::{Plugin, Reply};
use crate::infrastructure::database::{ColumnType, TableSchema};
use crate::infrastructure::repository::Repository;

pub const NAME: &str = "poll";

const VOTE_GROUP: &str = "vote";
const VOTES: &str = "votes";
const CHOICES: [&str; 2] = ["yes", "no"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// `<poll message id>:<user id>`, one vote per user and poll
    pub id: String,
    pub poll: String,
    pub user: String,
    pub choice: String,
}

fn validate_vote(vote: &Vote) -> Result<(), String> {
    if !CHOICES.contains(&vote.choice.as_str()) {
        return Err(format!("unknown choice '{}'", vote.choice));
    }
    if vote.poll.is_empty() || vote.user.is_empty() {
        return Err("vote needs a poll and a user".to_string());
    }
    Ok(())
}

pub struct PollPlugin;

/// Store or change one user's vote
async fn record_vote(repo: &Repository<Vote>, poll: &str, user: &str, choice: &str) -> Result<(), BotError> {
    let vote = Vote {
        id: format!("{}:{}", poll, user),
        poll: poll.to_string(),
        user: user.to_string(),
        choice: choice.to_string(),
    };
    if repo.create_if_absent(&vote).await?.is_none() {
        repo.update(&vote.id, json!({ "choice": choice })).await?;
    }
    Ok(())
}

async fn on_vote(ctx: Arc<PluginContext>, repo: Repository<Vote>, event: ComponentEvent) -> Result<(), BotError> {
    let Interaction::Component(press) = &event.interaction else {
        return Ok(());
    };
    record_vote(&repo, &press.message_id, &press.user.id, &event.component).await?;

    let ack = Reply::private(format!("Vote recorded: {}", event.component));
    best_effort(
        ctx.name(),
        "vote ack",
        ctx.platform().reply(&press.channel_id, &press.id, &ack),
    )
    .await;
    Ok(())
}

#[async_trait]
impl Plugin for PollPlugin {
    fn manifest(&self) -> Manifest {
        Manifest::new(NAME, env!("CARGO_PKG_VERSION"))
            .with_description("Yes/no polls")
            .with_soft_dependency(super::general::NAME)
            .with_command_group("poll")
    }

    fn config_defaults(&self) -> Value {
        json!({ "open-minutes": 10 })
    }

    fn validate_config(&self, config: &Value) -> Result<(), String> {
        match config.get("open-minutes").and_then(Value::as_u64) {
            Some(m) if (1..=1440).contains(&m) => Ok(()),
            _ => Err("open-minutes must be between 1 and 1440".to_string()),
        }
    }

    async fn init(&self, ctx: Arc<PluginContext>) -> Result<(), PluginError> {
        let minutes = ctx
            .config()
            .get("open-minutes")
            .and_then(Value::as_u64)
            .unwrap_or(10);

        ctx.ensure_table(
            TableSchema::new(VOTES)
                .required("poll", ColumnType::Text)
                .required("user", ColumnType::Text)
                .required("choice", ColumnType::Text),
        )
        .await
        .map_err(|e| PluginError::Init(e.to_string()))?;

        let repo: Repository<Vote> = ctx.repository(VOTES).with_validator(validate_vote);

        let handler_ctx = ctx.clone();
        let handler_repo = repo.clone();
        let buttons = GroupDescriptor::buttons(
            vec![
                ButtonSpec::new("yes", "Yes").with_style(ButtonStyle::Success),
                ButtonSpec::new("no", "No").with_style(ButtonStyle::Danger),
            ],
            move |event| on_vote(handler_ctx.clone(), handler_repo.clone(), event),
        )
        .message_scoped(Duration::from_secs(minutes * 60))
        .auto_disable()
        .with_filter(|event| !event.user().is_bot);
        ctx.components()
            .register(VOTE_GROUP, buttons)
            .map_err(|e| PluginError::Init(e.to_string()))?;

        ctx.register_command(
            Command::new("create", |interaction, ctx| async move {
                let question = interaction
                    .option_str("question")
                    .or_else(|| interaction.option_str(ARGS_OPTION))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if question.is_empty() {
                    return ctx
                        .reply(&interaction, Reply::private("Usage: poll create <question>"))
                        .await;
                }
                let message_id = ctx
                    .components()
                    .send(VOTE_GROUP, &interaction.channel_id, &question)
                    .await?;
                ctx.logger().debug(format!("Poll {} opened", message_id));
                ctx.reply(&interaction, Reply::private(format!("Poll #{} posted", message_id)))
                    .await
            })
            .with_description("Open a yes/no poll")
            .with_option(CommandOption::new("question", "What to ask", OptionKind::String).required()),
        )?;

        let results_repo = repo.clone();
        ctx.register_command(
            Command::new("results", move |interaction, ctx| {
                let repo = results_repo.clone();
                async move {
                    let Some(poll) = interaction
                        .option_str("poll")
                        .or_else(|| interaction.option_str(ARGS_OPTION))
                        .map(str::to_string)
                        .or_else(|| interaction.option_i64("poll").map(|n| n.to_string()))
                    else {
                        return ctx
                            .reply(&interaction, Reply::private("Usage: poll results <poll id>"))
                            .await;
                    };
                    let mut lines = Vec::new();
                    for choice in CHOICES {
                        let count = repo
                            .query()
                            .where_eq("poll", poll.as_str())
                            .where_eq("choice", choice)
                            .count()
                            .await?;
                        lines.push(format!("{}: {}", choice, count));
                    }
                    ctx.reply(&interaction, Reply::new(format!("Poll #{}\n{}", poll, lines.join("\n"))))
                        .await
                }
            })
            .with_description("Show a poll's tally")
            .with_option(CommandOption::new("poll", "Poll id", OptionKind::String).required()),
        )?;

        if let Some(general) = ctx.get_plugin::<super::general::GeneralApi>(super::general::NAME) {
            ctx.logger().debug(format!("General plugin up since {}", general.started_at));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::DocumentStore;

    #[tokio::test]
    async fn test_revote_changes_choice() {
        let repo: Repository<Vote> =
            Repository::new(Arc::new(DocumentStore::in_memory()), "poll_votes").with_validator(validate_vote);

        record_vote(&repo, "12", "u1", "yes").await.unwrap();
        record_vote(&repo, "12", "u1", "no").await.unwrap();
        record_vote(&repo, "12", "u2", "no").await.unwrap();

        let votes = repo.find_all_by("poll", "12").await.unwrap();
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|v| v.choice == "no"));
    }

    #[tokio::test]
    async fn test_invalid_choice_rejected() {
        let repo: Repository<Vote> =
            Repository::new(Arc::new(DocumentStore::in_memory()), "poll_votes").with_validator(validate_vote);
        assert!(record_vote(&repo, "12", "u1", "maybe").await.is_err());
    }
}
