//! Failure isolation at handler boundaries
//!
//! `run_isolated` turns both errors and panics of a handler future into a
//! plain failure message. `best_effort` and `spawn_best_effort` run
//! secondary writes whose failure must never affect the primary one.

use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Await `fut`, converting an error or a panic into its message
pub async fn run_isolated<F, E>(fut: F) -> Result<(), String>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a secondary write; failures are logged and otherwise ignored.
///
/// Never retried, never propagated.
pub async fn best_effort<F, T, E>(owner: &str, what: &str, fut: F)
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let outcome = run_isolated(async move { fut.await.map(|_| ()) }).await;
    if let Err(e) = outcome {
        tracing::warn!(plugin = %owner, action = %what, error = %e, "Best-effort action failed");
    }
}

/// Detached variant of [`best_effort`]
pub fn spawn_best_effort<F, T, E>(owner: impl Into<String>, what: impl Into<String>, fut: F)
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let owner = owner.into();
    let what = what.into();
    tokio::spawn(async move {
        best_effort(&owner, &what, fut).await;
    });
}
