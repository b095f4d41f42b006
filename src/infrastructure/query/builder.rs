//! Fluent, backend-agnostic query builder

use std::sync::Arc;

use serde_json::{Map, Value};

use super::condition::{check_identifier, Conjunction, Operator, Order, WhereCondition};
use crate::application::errors::QueryError;
use crate::infrastructure::database::Backend;

/// A stored row or document
pub type Record = Map<String, Value>;

/// What the query does once executed
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Select,
    Count,
    Insert { record: Record, on_conflict: OnConflict },
    Update { changes: Record },
    Delete,
}

/// Behaviour of an insert hitting a unique key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    #[default]
    Fail,
    Ignore,
}

/// Result of running a query.
///
/// `rows` is filled by selects; `affected` holds the number of written
/// records, or the count for `Action::Count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Record>,
    pub affected: u64,
}

/// A query against one table or collection
#[derive(Clone)]
pub struct Query {
    backend: Option<Arc<dyn Backend>>,
    pub(crate) table: String,
    pub(crate) conditions: Vec<WhereCondition>,
    pub(crate) order_by: Vec<(String, Order)>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) action: Action,
}

impl Query {
    /// Detached query, useful for compiling without a backend
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            backend: None,
            table: table.into(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            action: Action::Select,
        }
    }

    /// Query bound to a backend, ready to execute
    pub fn on(backend: Arc<dyn Backend>, table: impl Into<String>) -> Self {
        let mut query = Self::new(table);
        query.backend = Some(backend);
        query
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn conditions(&self) -> &[WhereCondition] {
        &self.conditions
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    fn push(mut self, field: &str, operator: Operator, value: Value, conjunction: Conjunction) -> Self {
        self.conditions.push(WhereCondition {
            field: field.to_string(),
            operator,
            value,
            conjunction,
        });
        self
    }

    /// AND-combine a condition with everything before it
    pub fn and_where(self, field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(field, operator, value.into(), Conjunction::And)
    }

    /// OR-combine a condition with everything before it
    pub fn or_where(self, field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(field, operator, value.into(), Conjunction::Or)
    }

    /// Shorthand for `and_where(field, Operator::Eq, value)`
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.and_where(field, Operator::Eq, value)
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order_by.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn insert(mut self, record: Record) -> Self {
        self.action = Action::Insert {
            record,
            on_conflict: OnConflict::Fail,
        };
        self
    }

    /// Insert that silently does nothing when a unique key already exists
    pub fn insert_ignore(mut self, record: Record) -> Self {
        self.action = Action::Insert {
            record,
            on_conflict: OnConflict::Ignore,
        };
        self
    }

    pub fn update(mut self, changes: Record) -> Self {
        self.action = Action::Update { changes };
        self
    }

    pub fn delete(mut self) -> Self {
        self.action = Action::Delete;
        self
    }

    /// Check every identifier and condition before compiling
    pub fn validate(&self) -> Result<(), QueryError> {
        check_identifier(&self.table)?;
        for condition in &self.conditions {
            condition.validate()?;
        }
        for (field, _) in &self.order_by {
            check_identifier(field)?;
        }
        match &self.action {
            Action::Insert { record, .. } => record.keys().try_for_each(|k| check_identifier(k)),
            Action::Update { changes } => {
                if changes.is_empty() {
                    return Err(QueryError::InvalidValue {
                        field: self.table.clone(),
                        reason: "update without changes".into(),
                    });
                }
                changes.keys().try_for_each(|k| check_identifier(k))
            }
            _ => Ok(()),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn Backend>, QueryError> {
        self.backend
            .as_ref()
            .ok_or_else(|| QueryError::Backend("query is not bound to a backend".into()))
    }

    /// Run the query as built
    pub async fn execute(&self) -> Result<QueryOutcome, QueryError> {
        self.validate()?;
        self.backend()?.execute(self).await
    }

    /// Every matching record
    pub async fn all(&self) -> Result<Vec<Record>, QueryError> {
        let mut query = self.clone();
        query.action = Action::Select;
        Ok(query.execute().await?.rows)
    }

    /// First matching record
    pub async fn first(&self) -> Result<Option<Record>, QueryError> {
        let mut query = self.clone();
        query.action = Action::Select;
        query.limit = Some(1);
        Ok(query.execute().await?.rows.into_iter().next())
    }

    /// Number of matching records, ignoring limit and offset
    pub async fn count(&self) -> Result<u64, QueryError> {
        let mut query = self.clone();
        query.action = Action::Count;
        query.limit = None;
        query.offset = None;
        Ok(query.execute().await?.affected)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table)
            .field("conditions", &self.conditions)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("action", &self.action)
            .field("bound", &self.backend.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_records_conjunctions_in_order() {
        let query = Query::new("users")
            .where_eq("role", "admin")
            .or_where("level", Operator::Gte, 10)
            .and_where("banned", Operator::Is, Value::Null);

        let conj: Vec<_> = query.conditions().iter().map(|c| c.conjunction).collect();
        assert_eq!(conj, vec![Conjunction::And, Conjunction::Or, Conjunction::And]);
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        assert!(Query::new("users; --").validate().is_err());
        assert!(Query::new("users").order_by("x y", Order::Asc).validate().is_err());

        let mut record = Record::new();
        record.insert("bad key".into(), json!(1));
        assert!(Query::new("users").insert(record).validate().is_err());
    }

    #[test]
    fn test_empty_update_is_rejected() {
        assert!(Query::new("users").update(Record::new()).validate().is_err());
    }

    #[tokio::test]
    async fn test_detached_query_cannot_execute() {
        let err = Query::new("users").all().await.unwrap_err();
        assert!(matches!(err, QueryError::Backend(_)));
    }
}
