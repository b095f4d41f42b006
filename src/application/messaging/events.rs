//! Event bus - fans one platform event out to every subscribed handler

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::application::errors::BotError;
use crate::application::plugins::PluginContext;
use crate::application::services::side_effects::run_isolated;
use crate::domain::entities::PlatformEvent;

/// Owner name used for listeners installed by the runtime itself
pub const CORE_OWNER: &str = "core";

/// Plugin-facing event handler; receives the owning plugin's context
pub type EventHandler = Arc<
    dyn Fn(PlatformEvent, Arc<PluginContext>) -> BoxFuture<'static, Result<(), BotError>>
        + Send
        + Sync,
>;

/// A bus listener with its context already bound
pub type Listener =
    Arc<dyn Fn(PlatformEvent) -> BoxFuture<'static, Result<(), BotError>> + Send + Sync>;

/// Wrap an async closure as a bus listener
pub fn listener<F, Fut>(f: F) -> Listener
where
    F: Fn(PlatformEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// An event handler registered by a plugin during init
#[derive(Clone)]
pub struct EventRegistration {
    pub event: String,
    pub once: bool,
    pub handler: EventHandler,
}

impl EventRegistration {
    pub fn new<F, Fut>(event: impl Into<String>, once: bool, handler: F) -> Self
    where
        F: Fn(PlatformEvent, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        Self {
            event: event.into(),
            once,
            handler: Arc::new(move |event, ctx| handler(event, ctx).boxed()),
        }
    }

    /// Bind the handler to its plugin's context
    pub fn bind(&self, ctx: Arc<PluginContext>) -> Listener {
        let handler = self.handler.clone();
        Arc::new(move |event| handler(event, ctx.clone()))
    }
}

impl std::fmt::Debug for EventRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistration")
            .field("event", &self.event)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

struct Subscription {
    id: u64,
    owner: String,
    event: String,
    once: bool,
    listener: Listener,
}

/// Ordered list of subscriptions.
///
/// Handlers for one occurrence run one after another in subscription order;
/// each one is isolated, so an error or panic is logged against its owner and
/// the next handler still runs.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listener; returns its subscription id
    pub fn subscribe(&self, owner: &str, event: &str, once: bool, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions().push(Subscription {
            id,
            owner: owner.to_string(),
            event: event.to_string(),
            once,
            listener,
        });
        tracing::debug!(plugin = %owner, event = %event, once, "Subscribed");
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.subscriptions();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Drop every subscription held by `owner`
    pub fn remove_owner(&self, owner: &str) {
        self.subscriptions().retain(|s| s.owner != owner);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.subscriptions().iter().filter(|s| s.event == event).count()
    }

    /// Deliver one occurrence. Returns how many handlers completed without error.
    pub async fn emit(&self, event: &PlatformEvent) -> usize {
        let name = event.name();

        // Snapshot under the lock; once-handlers leave before anything runs
        let targets: Vec<(String, Listener)> = {
            let mut subs = self.subscriptions();
            let targets = subs
                .iter()
                .filter(|s| s.event == name)
                .map(|s| (s.owner.clone(), s.listener.clone()))
                .collect();
            subs.retain(|s| !(s.once && s.event == name));
            targets
        };

        let mut succeeded = 0;
        for (owner, listener) in targets {
            let payload = event.clone();
            match run_isolated(async move { listener(payload).await }).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    tracing::error!(plugin = %owner, event = %name, error = %e, "Event handler failed");
                }
            }
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn recording(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> Listener {
        listener(move |_event| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(tag.to_string());
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_and_failures_are_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("a", "ready", false, recording(log.clone(), "a"));
        bus.subscribe(
            "b",
            "ready",
            false,
            listener(|_| async { Err(BotError::Internal("b broke".into())) }),
        );
        bus.subscribe(
            "c",
            "ready",
            false,
            listener(|_| async {
                if true {
                    panic!("c panicked");
                }
                Ok(())
            }),
        );
        bus.subscribe("d", "ready", false, recording(log.clone(), "d"));

        assert_eq!(bus.emit(&PlatformEvent::Ready).await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "d"]);
    }

    #[tokio::test]
    async fn test_once_handler_runs_once() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("a", "ready", true, recording(log.clone(), "once"));
        bus.subscribe("a", "ready", false, recording(log.clone(), "always"));

        bus.emit(&PlatformEvent::Ready).await;
        bus.emit(&PlatformEvent::Ready).await;
        assert_eq!(*log.lock().unwrap(), vec!["once", "always", "always"]);
        assert_eq!(bus.listener_count("ready"), 1);
    }

    #[tokio::test]
    async fn test_other_events_are_not_delivered() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("a", "guildMemberAdd", false, recording(log.clone(), "join"));
        let id = bus.subscribe("a", "ready", false, recording(log.clone(), "ready"));

        bus.emit(&PlatformEvent::Other {
            name: "guildMemberAdd".into(),
            payload: Value::Null,
        })
        .await;
        assert!(bus.unsubscribe(id));
        bus.emit(&PlatformEvent::Ready).await;
        assert_eq!(*log.lock().unwrap(), vec!["join"]);
    }
}
