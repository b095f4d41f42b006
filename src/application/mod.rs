//! Application layer - plugin hosting and event processing
//!
//! This layer contains:
//! - Plugins: dependency resolution, contexts and the lifecycle host
//! - Messaging: command routing, text parsing, the event bus
//! - Components: namespaced interactive elements and collectors
//! - Services: scheduling and failure isolation
//! - Errors: layer-specific error types

pub mod components;
pub mod errors;
pub mod messaging;
pub mod plugins;
pub mod runtime;
pub mod services;

pub use runtime::Runtime;
