//! Periodic background tasks, independent of command and event dispatch

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::side_effects::run_isolated;
use crate::application::errors::BotError;

struct ScheduledTask {
    owner: String,
    handle: JoinHandle<()>,
}

/// Keyed set of interval timers.
///
/// Scheduling under an id that is already taken cancels the previous timer.
#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` every `every`, first run one period from now.
    ///
    /// A failing or panicking run is logged; the timer keeps going.
    pub fn schedule<F, Fut>(&self, owner: &str, id: &str, every: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let task_owner = owner.to_string();
        let task_id = id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = run_isolated(async { task().await }).await {
                    tracing::error!(plugin = %task_owner, task = %task_id, error = %e, "Scheduled task failed");
                }
            }
        });

        let previous = self.tasks().insert(
            id.to_string(),
            ScheduledTask {
                owner: owner.to_string(),
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
            tracing::debug!(plugin = %owner, task = %id, "Replaced scheduled task");
        } else {
            tracing::debug!(plugin = %owner, task = %id, every_ms = every.as_millis() as u64, "Scheduled task");
        }
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.tasks().remove(id) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every task registered by `owner`
    pub fn cancel_owner(&self, owner: &str) {
        self.tasks().retain(|_, task| {
            let keep = task.owner != owner;
            if !keep {
                task.handle.abort();
            }
            keep
        });
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.tasks().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        for (_, task) in self.tasks().drain() {
            task.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_interval() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        scheduler.schedule("p", "tick", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    return Err(BotError::Internal("first run fails".into()));
                }
                if n == 1 {
                    panic!("second run panics");
                }
                Ok(())
            }
        });

        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_id_replaces_timer() {
        let scheduler = Scheduler::new();
        let old_runs = Arc::new(AtomicUsize::new(0));
        let new_runs = Arc::new(AtomicUsize::new(0));

        let counter = old_runs.clone();
        scheduler.schedule("p", "job", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let counter = new_runs.clone();
        scheduler.schedule("p", "job", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(old_runs.load(Ordering::SeqCst), 0);
        assert_eq!(new_runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_owner() {
        let scheduler = Scheduler::new();
        scheduler.schedule("a", "a:1", Duration::from_secs(60), || async { Ok(()) });
        scheduler.schedule("b", "b:1", Duration::from_secs(60), || async { Ok(()) });
        scheduler.cancel_owner("a");
        assert!(!scheduler.is_scheduled("a:1"));
        assert!(scheduler.is_scheduled("b:1"));
        scheduler.shutdown();
        assert!(scheduler.is_empty());
    }
}
