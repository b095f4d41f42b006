use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{Backend, BackendKind, RawQuery, TableSchema};
use crate::application::errors::QueryError;
use crate::infrastructure::query::condition::quote_identifier;
use crate::infrastructure::query::sql::{self, SqlStatement};
use crate::infrastructure::query::{Action, Query, QueryOutcome, Record};

/// SQLite-backed storage, one connection shared process-wide
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, QueryError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueryError> {
        self.conn
            .lock()
            .map_err(|_| QueryError::Backend("Lock poisoned".to_string()))
    }

    fn select(conn: &Connection, stmt: &SqlStatement) -> Result<Vec<Record>, rusqlite::Error> {
        let mut prepared = conn.prepare(&stmt.sql)?;
        let columns: Vec<(String, Option<String>)> = prepared
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_uppercase)))
            .collect();

        let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, (name, decl)) in columns.iter().enumerate() {
                record.insert(name.clone(), decode(row.get_ref(idx)?, decl.as_deref()));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn run(&self, table: &str, stmt: &SqlStatement, action: &Action) -> Result<QueryOutcome, QueryError> {
        let conn = self.lock()?;
        tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "sqlite");
        let outcome = match action {
            Action::Select => QueryOutcome {
                rows: Self::select(&conn, stmt).map_err(|e| map_error(table, e))?,
                affected: 0,
            },
            Action::Count => {
                let count: i64 = conn
                    .query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| row.get(0))
                    .map_err(|e| map_error(table, e))?;
                QueryOutcome {
                    rows: Vec::new(),
                    affected: count.max(0) as u64,
                }
            }
            Action::Insert { .. } | Action::Update { .. } | Action::Delete => {
                let affected = conn
                    .execute(&stmt.sql, params_from_iter(stmt.params.iter()))
                    .map_err(|e| map_error(table, e))?;
                QueryOutcome {
                    rows: Vec::new(),
                    affected: affected as u64,
                }
            }
        };
        Ok(outcome)
    }
}

/// Decode a column value, using the declared type for booleans and JSON
fn decode(value: ValueRef<'_>, decl: Option<&str>) -> Value {
    match (value, decl) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), Some("BOOLEAN")) => Value::Bool(i != 0),
        (ValueRef::Integer(i), _) => Value::from(i),
        (ValueRef::Real(f), _) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        (ValueRef::Text(t), Some("JSON")) => {
            let text = String::from_utf8_lossy(t);
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
        }
        (ValueRef::Text(t), _) => Value::String(String::from_utf8_lossy(t).into_owned()),
        (ValueRef::Blob(b), _) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Surface unique-key violations as their own error, everything else unchanged
fn map_error(table: &str, err: rusqlite::Error) -> QueryError {
    if let rusqlite::Error::SqliteFailure(ref failure, ref msg) = err {
        let unique = failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
        if failure.code == ErrorCode::ConstraintViolation && unique {
            return QueryError::DuplicateKey {
                collection: table.to_string(),
                detail: msg.clone().unwrap_or_default(),
            };
        }
    }
    QueryError::Database(err)
}

/// Build the `CREATE TABLE IF NOT EXISTS` statement for a schema
pub fn create_table_sql(schema: &TableSchema) -> Result<String, QueryError> {
    let mut defs = vec![format!("{} TEXT PRIMARY KEY", quote_identifier(&schema.key)?)];
    for column in schema.columns.iter().filter(|c| c.name != schema.key) {
        let mut def = format!("{} {}", quote_identifier(&column.name)?, column.kind.as_sql());
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if column.unique {
            def.push_str(" UNIQUE");
        }
        defs.push(def);
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(&schema.name)?,
        defs.join(", ")
    ))
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn execute(&self, query: &Query) -> Result<QueryOutcome, QueryError> {
        let stmt = sql::compile(query)?;
        self.run(query.table(), &stmt, query.action())
    }

    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), QueryError> {
        let ddl = create_table_sql(schema)?;
        self.lock()?.execute_batch(&ddl)?;
        Ok(())
    }

    async fn raw(&self, query: RawQuery) -> Result<QueryOutcome, QueryError> {
        let RawQuery::Sql { sql, params } = query else {
            return Err(QueryError::Unsupported(
                "document commands on a relational backend".into(),
            ));
        };
        let stmt = SqlStatement { sql, params };
        let conn = self.lock()?;
        let returns_rows = conn.prepare(&stmt.sql)?.column_count() > 0;
        if returns_rows {
            Ok(QueryOutcome {
                rows: Self::select(&conn, &stmt).map_err(|e| map_error("raw", e))?,
                affected: 0,
            })
        } else {
            let affected = conn
                .execute(&stmt.sql, params_from_iter(stmt.params.iter()))
                .map_err(|e| map_error("raw", e))?;
            Ok(QueryOutcome {
                rows: Vec::new(),
                affected: affected as u64,
            })
        }
    }
}
