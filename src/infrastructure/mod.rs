//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: bot and per-plugin configuration
//! - Query / Database: the query DSL, its compilers and the storage backends
//! - Repository: typed record access on top of queries
//! - Adapters: platform integrations (Telegram, console)

pub mod adapters;
pub mod config;
pub mod database;
pub mod query;
pub mod repository;
