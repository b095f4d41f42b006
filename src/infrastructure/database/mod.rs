//! Storage backends behind the query DSL
//!
//! A deployment runs exactly one backend, shared by every plugin:
//! - `SqliteBackend`: compiles queries to parameter-bound SQL
//! - `DocumentStore`: compiles queries to filter objects over JSON documents

pub mod document;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::errors::QueryError;
use crate::infrastructure::query::{DocumentCommand, Query, QueryOutcome};

pub use document::DocumentStore;
pub use schema::{Column, ColumnType, TableSchema};
pub use sqlite::SqliteBackend;

/// Which backend a deployment runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Document,
}

/// Escape hatch for statements the DSL cannot express
#[derive(Debug, Clone)]
pub enum RawQuery {
    /// SQL with positional parameters; identifiers are the caller's responsibility
    Sql { sql: String, params: Vec<SqlValue> },
    /// A hand-built document command
    Document(DocumentCommand),
}

/// Backend trait - executes compiled queries against shared storage
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Compile and run a query as one atomic backend call
    async fn execute(&self, query: &Query) -> Result<QueryOutcome, QueryError>;

    /// Create the table or unique indexes if they do not exist yet
    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), QueryError>;

    async fn raw(&self, query: RawQuery) -> Result<QueryOutcome, QueryError>;
}

/// Open the configured backend
pub fn open(
    kind: BackendKind,
    path: Option<&std::path::Path>,
) -> Result<Arc<dyn Backend>, QueryError> {
    let backend: Arc<dyn Backend> = match (kind, path) {
        (BackendKind::Sqlite, Some(path)) => Arc::new(SqliteBackend::open(path)?),
        (BackendKind::Sqlite, None) => Arc::new(SqliteBackend::open_in_memory()?),
        (BackendKind::Document, Some(path)) => Arc::new(DocumentStore::open(path)?),
        (BackendKind::Document, None) => Arc::new(DocumentStore::in_memory()),
    };
    tracing::info!(backend = ?kind, "Storage backend ready");
    Ok(backend)
}
