//! Application services - scheduling and failure isolation

pub mod scheduler;
pub mod side_effects;

pub use scheduler::Scheduler;
pub use side_effects::{best_effort, run_isolated, spawn_best_effort};
