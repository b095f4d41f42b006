//! Typed CRUD facade over the query builder
//!
//! Records are serialized through `serde_json`, so any `Serialize +
//! DeserializeOwned` type with a string key field can be stored in either
//! backend.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::application::errors::RepositoryError;
use crate::infrastructure::database::Backend;
use crate::infrastructure::query::{Operator, Query, Record};

/// Read-check-write rounds before `update` gives up on a busy record
const UPDATE_ATTEMPTS: usize = 3;

/// Checks an entity before it is written and after it is read
pub trait Validator<T>: Send + Sync {
    fn validate(&self, entity: &T) -> Result<(), String>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, entity: &T) -> Result<(), String> {
        self(entity)
    }
}

pub struct Repository<T> {
    backend: Arc<dyn Backend>,
    table: String,
    key: String,
    validator: Option<Arc<dyn Validator<T>>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            table: self.table.clone(),
            key: self.key.clone(),
            validator: self.validator.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(backend: Arc<dyn Backend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
            key: "id".to_string(),
            validator: None,
            _entity: PhantomData,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_validator(mut self, validator: impl Validator<T> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Raw query on the repository's table
    pub fn query(&self) -> Query {
        Query::on(self.backend.clone(), self.table.clone())
    }

    fn check(&self, entity: &T) -> Result<(), RepositoryError> {
        match &self.validator {
            Some(validator) => validator.validate(entity).map_err(RepositoryError::Validation),
            None => Ok(()),
        }
    }

    /// Decode a stored record, dropping it when it fails to decode or validate
    fn decode(&self, record: Record) -> Option<T> {
        let entity: T = match serde_json::from_value(Value::Object(record)) {
            Ok(entity) => entity,
            Err(e) => {
                tracing::debug!(table = %self.table, error = %e, "Skipping undecodable record");
                return None;
            }
        };
        match self.check(&entity) {
            Ok(()) => Some(entity),
            Err(e) => {
                tracing::debug!(table = %self.table, error = %e, "Skipping invalid record");
                None
            }
        }
    }

    fn encode(&self, entity: &T) -> Result<Record, RepositoryError> {
        match serde_json::to_value(entity)? {
            Value::Object(record) => Ok(record),
            _ => Err(RepositoryError::Validation(format!(
                "{} records must serialize to an object",
                self.table
            ))),
        }
    }

    pub async fn find(&self, key: &str) -> Result<Option<T>, RepositoryError> {
        self.find_by(&self.key, key).await
    }

    pub async fn find_by(&self, field: &str, value: impl Into<Value>) -> Result<Option<T>, RepositoryError> {
        // Scan past invalid records rather than stopping at the first match
        let rows = self.query().where_eq(field, value).all().await?;
        Ok(rows.into_iter().find_map(|r| self.decode(r)))
    }

    pub async fn find_all(&self) -> Result<Vec<T>, RepositoryError> {
        let rows = self.query().all().await?;
        Ok(rows.into_iter().filter_map(|r| self.decode(r)).collect())
    }

    pub async fn find_all_by(&self, field: &str, value: impl Into<Value>) -> Result<Vec<T>, RepositoryError> {
        let rows = self.query().where_eq(field, value).all().await?;
        Ok(rows.into_iter().filter_map(|r| self.decode(r)).collect())
    }

    fn prepare(&self, entity: &T) -> Result<Record, RepositoryError> {
        self.check(entity)?;
        let mut record = self.encode(entity)?;
        let missing = record.get(&self.key).map_or(true, Value::is_null);
        if missing {
            record.insert(self.key.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        Ok(record)
    }

    /// Insert a new entity, assigning a key when it has none.
    ///
    /// Returns the stored entity including generated fields.
    pub async fn create(&self, entity: &T) -> Result<T, RepositoryError> {
        let record = self.prepare(entity)?;
        self.query().insert(record.clone()).execute().await?;
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    /// Insert unless the key already exists; `None` means nothing was written
    pub async fn create_if_absent(&self, entity: &T) -> Result<Option<T>, RepositoryError> {
        let record = self.prepare(entity)?;
        let outcome = self.query().insert_ignore(record.clone()).execute().await?;
        if outcome.affected == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(Value::Object(record))?))
    }

    /// Apply a partial update. Returns `false` without writing when the key is absent.
    ///
    /// With a validator the merged record is checked first, and the write only
    /// lands if the scalar fields it was checked against are still unchanged.
    /// A record that keeps changing underneath fails with `Conflict`.
    pub async fn update(&self, key: &str, patch: Value) -> Result<bool, RepositoryError> {
        let Value::Object(changes) = patch else {
            return Err(RepositoryError::Validation("update patch must be an object".into()));
        };
        if changes.is_empty() {
            return self.exists(key).await;
        }

        if self.validator.is_none() {
            let outcome = self.query().where_eq(&self.key, key).update(changes).execute().await?;
            return Ok(outcome.affected > 0);
        }

        for _ in 0..UPDATE_ATTEMPTS {
            let Some(snapshot) = self.query().where_eq(&self.key, key).first().await? else {
                return Ok(false);
            };
            let mut merged = snapshot.clone();
            for (field, value) in &changes {
                merged.insert(field.clone(), value.clone());
            }
            let entity: T = serde_json::from_value(Value::Object(merged))?;
            self.check(&entity)?;

            let mut guarded = self.query().where_eq(&self.key, key);
            for (field, value) in &snapshot {
                guarded = match value {
                    Value::Null => guarded.and_where(field, Operator::Is, Value::Null),
                    Value::Array(_) | Value::Object(_) => guarded,
                    _ => guarded.where_eq(field, value.clone()),
                };
            }
            let outcome = guarded.update(changes.clone()).execute().await?;
            if outcome.affected > 0 {
                return Ok(true);
            }
        }
        Err(RepositoryError::Conflict(key.to_string()))
    }

    pub async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let outcome = self.query().where_eq(&self.key, key).delete().execute().await?;
        Ok(outcome.affected > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.query().where_eq(&self.key, key).count().await? > 0)
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.query().count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{ColumnType, DocumentStore, TableSchema};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        text: String,
    }

    async fn repo() -> Repository<Note> {
        let backend: Arc<dyn Backend> = Arc::new(DocumentStore::in_memory());
        backend
            .ensure_schema(&TableSchema::new("notes").column("text", ColumnType::Text))
            .await
            .unwrap();
        Repository::new(backend, "notes")
    }

    #[tokio::test]
    async fn test_create_assigns_key() {
        let repo = repo().await;
        let note = repo.create(&Note { id: None, text: "hi".into() }).await.unwrap();
        let id = note.id.clone().unwrap();
        assert_eq!(repo.find(&id).await.unwrap(), Some(note));
    }

    #[tokio::test]
    async fn test_validator_blocks_write() {
        let repo = repo().await.with_validator(|n: &Note| {
            if n.text.is_empty() { Err("empty text".to_string()) } else { Ok(()) }
        });
        let err = repo.create(&Note { id: None, text: String::new() }).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_records_are_dropped_on_read() {
        let plain = repo().await;
        plain.create(&Note { id: Some("a".into()), text: "ok".into() }).await.unwrap();
        plain.create(&Note { id: Some("b".into()), text: "BAD".into() }).await.unwrap();

        let strict = plain.clone().with_validator(|n: &Note| {
            if n.text == "BAD" { Err("shouting".to_string()) } else { Ok(()) }
        });
        assert_eq!(strict.find_all().await.unwrap().len(), 1);
        assert_eq!(strict.find("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_if_absent() {
        let repo = repo().await;
        let note = Note { id: Some("k".into()), text: "one".into() };
        assert!(repo.create_if_absent(&note).await.unwrap().is_some());
        assert!(repo.create_if_absent(&note).await.unwrap().is_none());
        assert!(repo.create(&note).await.is_err());
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        balance: i64,
        cap: i64,
    }

    /// Store that lets another writer sneak in right after the first read
    struct Interleaved {
        inner: Arc<dyn Backend>,
        pending: std::sync::Mutex<Option<Query>>,
    }

    #[async_trait::async_trait]
    impl Backend for Interleaved {
        fn kind(&self) -> crate::infrastructure::database::BackendKind {
            self.inner.kind()
        }

        async fn execute(&self, query: &Query) -> Result<crate::infrastructure::query::QueryOutcome, crate::application::errors::QueryError> {
            let outcome = self.inner.execute(query).await?;
            if matches!(query.action(), crate::infrastructure::query::Action::Select) {
                let pending = self.pending.lock().unwrap().take();
                if let Some(write) = pending {
                    write.execute().await?;
                }
            }
            Ok(outcome)
        }

        async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), crate::application::errors::QueryError> {
            self.inner.ensure_schema(schema).await
        }

        async fn raw(
            &self,
            query: crate::infrastructure::database::RawQuery,
        ) -> Result<crate::infrastructure::query::QueryOutcome, crate::application::errors::QueryError> {
            self.inner.raw(query).await
        }
    }

    #[tokio::test]
    async fn test_update_revalidates_after_concurrent_change() {
        let inner: Arc<dyn Backend> = Arc::new(DocumentStore::in_memory());
        inner
            .ensure_schema(
                &TableSchema::new("accounts")
                    .column("balance", ColumnType::Integer)
                    .column("cap", ColumnType::Integer),
            )
            .await
            .unwrap();
        let plain: Repository<Account> = Repository::new(inner.clone(), "accounts");
        plain
            .create(&Account { id: "a".into(), balance: 0, cap: 100 })
            .await
            .unwrap();

        let mut lowered = Record::new();
        lowered.insert("cap".into(), serde_json::json!(50));
        let backend: Arc<dyn Backend> = Arc::new(Interleaved {
            inner: inner.clone(),
            pending: std::sync::Mutex::new(Some(Query::on(inner, "accounts").where_eq("id", "a").update(lowered))),
        });
        let repo = Repository::new(backend, "accounts").with_validator(|a: &Account| {
            if a.balance > a.cap { Err("over limit".to_string()) } else { Ok(()) }
        });

        // Checked against cap 100, but the cap drops to 50 before the write
        let err = repo.update("a", serde_json::json!({ "balance": 80 })).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Validation(_)), "{:?}", err);
        assert_eq!(
            plain.find("a").await.unwrap(),
            Some(Account { id: "a".into(), balance: 0, cap: 50 })
        );

        assert!(repo.update("a", serde_json::json!({ "balance": 40 })).await.unwrap());
        assert_eq!(plain.find("a").await.unwrap().map(|a| a.balance), Some(40));
    }
}
