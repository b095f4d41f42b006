//! Domain layer - Core types shared by every other layer
//!
//! This layer contains:
//! - Entities: manifests, commands, interactions, interactive elements
//! - Traits: the plugin contract and the outbound platform contract

pub mod entities;
pub mod traits;
