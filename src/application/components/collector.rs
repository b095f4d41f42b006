//! Message-scoped collectors
//!
//! A collector binds one group to one sent message until a deadline. It keeps
//! its own copy of the descriptor, so unregistering the group afterwards does
//! not affect it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::descriptor::GroupDescriptor;
use crate::application::services::side_effects::best_effort;
use crate::domain::entities::ActionRow;
use crate::domain::traits::Platform;

/// One live binding between a message and a group
#[derive(Debug)]
pub struct Collector {
    pub plugin: String,
    pub group: String,
    pub channel_id: String,
    pub message_id: String,
    pub deadline: Instant,
    pub descriptor: Arc<GroupDescriptor>,
    /// Rows as sent, used to build the disabled copy
    pub rows: Vec<ActionRow>,
}

impl Collector {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

struct Active {
    generation: u64,
    collector: Arc<Collector>,
    expiry: JoinHandle<()>,
}

#[derive(Default)]
pub struct Collectors {
    active: Arc<Mutex<HashMap<String, Active>>>,
    generation: AtomicU64,
}

fn lock(map: &Mutex<HashMap<String, Active>>) -> MutexGuard<'_, HashMap<String, Active>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Collectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting on a message. A collector already bound to the same
    /// message is replaced.
    pub fn attach(&self, collector: Collector, platform: Arc<dyn Platform>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let collector = Arc::new(collector);
        let message_id = collector.message_id.clone();

        // Held until the entry is in, so an already-due expiry cannot miss it
        let mut map = lock(&self.active);
        let active = self.active.clone();
        let expiring = collector.clone();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep_until(expiring.deadline).await;
            {
                let mut map = lock(&active);
                if map.get(&expiring.message_id).is_some_and(|a| a.generation == generation) {
                    map.remove(&expiring.message_id);
                }
            }
            tracing::debug!(
                plugin = %expiring.plugin,
                group = %expiring.group,
                message = %expiring.message_id,
                "Collector expired"
            );
            if expiring.descriptor.auto_disable {
                let disabled: Vec<ActionRow> = expiring.rows.iter().map(ActionRow::disabled).collect();
                best_effort(
                    &expiring.plugin,
                    "disable components",
                    platform.edit_components(&expiring.channel_id, &expiring.message_id, &disabled),
                )
                .await;
            }
        });

        let previous = map.insert(
            message_id,
            Active {
                generation,
                collector,
                expiry,
            },
        );
        drop(map);
        if let Some(previous) = previous {
            previous.expiry.abort();
        }
    }

    /// Live collector bound to `message_id`, expired or not
    pub fn get(&self, message_id: &str) -> Option<Arc<Collector>> {
        lock(&self.active).get(message_id).map(|a| a.collector.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every collector without running its cleanup
    pub fn abort_all(&self) {
        for (_, active) in lock(&self.active).drain() {
            active.expiry.abort();
        }
    }
}
