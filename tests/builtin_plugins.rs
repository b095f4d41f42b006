mod common;

use std::sync::Arc;

use common::{test_config, RecordingPlatform};
use plexus::application::Runtime;
use plexus::domain::entities::{ComponentInteraction, Interaction, Message, PlatformEvent, User};
use plexus::plugins;

async fn started(dir: &tempfile::TempDir) -> (Runtime, Arc<RecordingPlatform>) {
    let platform = RecordingPlatform::new();
    let mut runtime = Runtime::new(test_config(dir.path()), platform.clone(), plugins::builtin()).unwrap();
    let report = runtime.start().await;
    assert_eq!(report.loaded, vec!["general", "poll"]);
    (runtime, platform)
}

fn say(user: &str, text: &str) -> PlatformEvent {
    PlatformEvent::MessageCreate(Message::new("c1", text).with_sender(User::new(user)))
}

fn vote(user: &str, message_id: &str, choice: &str) -> PlatformEvent {
    PlatformEvent::InteractionCreate(Interaction::Component(ComponentInteraction::new(
        "c1",
        message_id,
        User::new(user),
        format!("poll:vote:{}", choice),
    )))
}

#[tokio::test]
async fn test_default_configs_are_generated() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, platform) = started(&dir).await;

    assert!(dir.path().join("general.yaml").exists());
    assert!(dir.path().join("poll.yaml").exists());

    runtime.handle(say("u1", "/hello name=Ann")).await;
    runtime.handle(say("u1", "/ping")).await;
    assert_eq!(platform.reply_texts(), vec!["Hello, Ann!", "Pong!"]);
}

#[tokio::test]
async fn test_edited_config_is_used_and_invalid_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("general.yaml"), "greeting: Howdy\n").unwrap();
    std::fs::write(dir.path().join("poll.yaml"), "open-minutes: 0\n").unwrap();
    let (runtime, platform) = started(&dir).await;

    runtime.handle(say("u1", "/hello name=Ann")).await;
    assert_eq!(platform.reply_texts(), vec!["Howdy, Ann!"]);

    let ctx = runtime.host().record("poll").unwrap().context.clone().unwrap();
    assert_eq!(ctx.config()["open-minutes"], 10);
}

#[tokio::test]
async fn test_poll_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, platform) = started(&dir).await;

    runtime.handle(say("u1", "/poll create Pizza for lunch?")).await;
    let posted = platform.messages();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].text, "Pizza for lunch?");
    let ids: Vec<&str> = posted[0].rows[0].components.iter().map(|c| c.custom_id()).collect();
    assert_eq!(ids, vec!["poll:vote:yes", "poll:vote:no"]);
    let poll = posted[0].id.clone();
    assert_eq!(runtime.services().components.active_collectors(), 1);

    runtime.handle(vote("u1", &poll, "yes")).await;
    runtime.handle(vote("u2", &poll, "yes")).await;
    // Changing a vote replaces it
    runtime.handle(vote("u1", &poll, "no")).await;

    runtime.handle(say("u3", &format!("/poll results poll={}", poll))).await;
    let replies = platform.reply_texts();
    assert_eq!(replies.first().map(String::as_str), Some(format!("Poll #{} posted", poll).as_str()));
    assert_eq!(
        replies.last().map(String::as_str),
        Some(format!("Poll #{}\nyes: 1\nno: 1", poll).as_str())
    );
    assert_eq!(replies.iter().filter(|r| r.starts_with("Vote recorded")).count(), 3);
}

#[tokio::test]
async fn test_hello_defaults_to_the_senders_name() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, platform) = started(&dir).await;

    let named = User::new("u1").with_username("ann").with_name("Ann Lee");
    let event = PlatformEvent::MessageCreate(Message::new("c1", "/hello").with_sender(named));
    runtime.handle(event).await;
    runtime.handle(say("u2", "/hello")).await;
    assert_eq!(platform.reply_texts(), vec!["Hello, Ann Lee!", "Hello, u2!"]);
}

#[tokio::test]
async fn test_bot_votes_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, platform) = started(&dir).await;

    runtime.handle(say("u1", "/poll create Tabs or spaces?")).await;
    let poll = platform.messages()[0].id.clone();

    let bot_vote = ComponentInteraction::new("c1", &poll, User::new("b1").as_bot(), "poll:vote:yes");
    runtime
        .handle(PlatformEvent::InteractionCreate(Interaction::Component(bot_vote)))
        .await;
    runtime.handle(vote("u2", &poll, "no")).await;

    runtime.handle(say("u3", &format!("/poll results poll={}", poll))).await;
    let replies = platform.reply_texts();
    assert_eq!(replies.iter().filter(|r| r.starts_with("Vote recorded")).count(), 1);
    assert_eq!(
        replies.last().map(String::as_str),
        Some(format!("Poll #{}\nyes: 0\nno: 1", poll).as_str())
    );
}

#[tokio::test]
async fn test_poll_without_question_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let (runtime, platform) = started(&dir).await;

    runtime.handle(say("u1", "/poll create")).await;
    assert!(platform.messages().is_empty());
    assert_eq!(platform.reply_texts(), vec!["Usage: poll create <question>"]);
}
