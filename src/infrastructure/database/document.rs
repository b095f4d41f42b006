//! JSON document store evaluating compiled filter objects.
//!
//! Collections live in memory behind one mutex; when opened with a path the
//! whole store is snapshotted to a JSON file after every write.

use async_trait::async_trait;
use regex_lite::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{Backend, BackendKind, RawQuery, TableSchema};
use crate::application::errors::QueryError;
use crate::infrastructure::query::document::{self, DocumentCommand};
use crate::infrastructure::query::{Query, QueryOutcome, Record};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collection {
    #[serde(default)]
    unique: Vec<String>,
    #[serde(default)]
    documents: Vec<Record>,
}

impl Collection {
    /// Name of the first unique field `candidate` would collide on
    fn conflict(&self, candidate: &Record, skip: Option<usize>) -> Option<String> {
        conflict_in(&self.unique, &self.documents, candidate, skip)
    }
}

fn conflict_in(unique: &[String], documents: &[Record], candidate: &Record, skip: Option<usize>) -> Option<String> {
    unique.iter().find_map(|field| {
        let value = candidate.get(field).filter(|v| !v.is_null())?;
        documents
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != skip)
            .any(|(_, doc)| doc.get(field).is_some_and(|v| same_value(v, value)))
            .then(|| format!("{} = {}", field, value))
    })
}

/// Document-store backend
pub struct DocumentStore {
    collections: Mutex<HashMap<String, Collection>>,
    path: Option<PathBuf>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open a store persisted at `path`, loading the previous snapshot if any
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| QueryError::Backend(format!("Failed to read store: {}", e)))?;
            serde_json::from_str(&content)
                .map_err(|e| QueryError::Backend(format!("Failed to parse store: {}", e)))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            collections: Mutex::new(collections),
            path: Some(path),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Collection>>, QueryError> {
        self.collections
            .lock()
            .map_err(|_| QueryError::Backend("Lock poisoned".to_string()))
    }

    fn persist(&self, collections: &HashMap<String, Collection>) -> Result<(), QueryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_vec(collections)
            .map_err(|e| QueryError::Backend(format!("Failed to encode store: {}", e)))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| QueryError::Backend(format!("Failed to write store: {}", e)))
    }

    /// Run one compiled command atomically
    pub fn apply(&self, command: DocumentCommand) -> Result<QueryOutcome, QueryError> {
        let mut collections = self.lock()?;
        let mut dirty = false;

        let outcome = match command {
            DocumentCommand::Find {
                collection,
                filter,
                sort,
                skip,
                limit,
            } => {
                let mut rows = Vec::new();
                if let Some(col) = collections.get(&collection) {
                    for doc in &col.documents {
                        if matches(&filter, doc)? {
                            rows.push(doc.clone());
                        }
                    }
                }
                if !sort.is_empty() {
                    rows.sort_by(|a, b| {
                        sort.iter()
                            .map(|(field, dir)| {
                                let ord = compare_for_sort(field_value(a, field), field_value(b, field));
                                if *dir < 0 { ord.reverse() } else { ord }
                            })
                            .find(|ord| *ord != Ordering::Equal)
                            .unwrap_or(Ordering::Equal)
                    });
                }
                let rows = rows
                    .into_iter()
                    .skip(skip.unwrap_or(0) as usize)
                    .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
                    .collect();
                QueryOutcome { rows, affected: 0 }
            }
            DocumentCommand::Count { collection, filter } => {
                let mut count = 0;
                if let Some(col) = collections.get(&collection) {
                    for doc in &col.documents {
                        if matches(&filter, doc)? {
                            count += 1;
                        }
                    }
                }
                QueryOutcome {
                    rows: Vec::new(),
                    affected: count,
                }
            }
            DocumentCommand::Insert {
                collection,
                document,
                ignore_conflict,
            } => {
                let col = collections.entry(collection.clone()).or_default();
                match col.conflict(&document, None) {
                    Some(_) if ignore_conflict => QueryOutcome::default(),
                    Some(detail) => return Err(QueryError::DuplicateKey { collection, detail }),
                    None => {
                        col.documents.push(document);
                        dirty = true;
                        QueryOutcome {
                            rows: Vec::new(),
                            affected: 1,
                        }
                    }
                }
            }
            DocumentCommand::Update {
                collection,
                filter,
                set,
            } => {
                let mut affected = 0;
                if let Some(col) = collections.get_mut(&collection) {
                    // Work on a copy so a conflict leaves nothing half-applied
                    let mut next = col.documents.clone();
                    let mut touched = Vec::new();
                    for (idx, doc) in next.iter_mut().enumerate() {
                        if matches(&filter, doc)? {
                            for (k, v) in &set {
                                doc.insert(k.clone(), v.clone());
                            }
                            touched.push(idx);
                        }
                    }
                    for idx in &touched {
                        if let Some(detail) = conflict_in(&col.unique, &next, &next[*idx], Some(*idx)) {
                            return Err(QueryError::DuplicateKey { collection, detail });
                        }
                    }
                    affected = touched.len() as u64;
                    if affected > 0 {
                        col.documents = next;
                    }
                }
                dirty = affected > 0;
                QueryOutcome {
                    rows: Vec::new(),
                    affected,
                }
            }
            DocumentCommand::Delete { collection, filter } => {
                let mut affected = 0;
                if let Some(col) = collections.get_mut(&collection) {
                    let mut kept = Vec::with_capacity(col.documents.len());
                    for doc in col.documents.drain(..) {
                        if matches(&filter, &doc)? {
                            affected += 1;
                        } else {
                            kept.push(doc);
                        }
                    }
                    col.documents = kept;
                }
                dirty = affected > 0;
                QueryOutcome {
                    rows: Vec::new(),
                    affected,
                }
            }
        };

        if dirty {
            self.persist(&collections)?;
        }
        Ok(outcome)
    }
}

fn field_value<'a>(doc: &'a Record, field: &str) -> &'a Value {
    doc.get(field).unwrap_or(&Value::Null)
}

/// Exact equality, used for unique keys
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric view of a stored value; booleans are stored as 0 and 1
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

/// Text view of a scalar, as SQLite renders it for `LIKE` and text comparisons
fn text_form(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(u8::from(*b).to_string()),
        _ => None,
    }
}

/// Compare a stored value with a filter operand under SQLite's affinity rules.
///
/// A numeric value converts a numeric-looking text operand and sorts before
/// any other text. A text value compares against the operand's text form.
/// Null never compares.
fn compare_stored(value: &Value, operand: &Value) -> Option<Ordering> {
    if let Some(x) = numeric(value) {
        if let Some(y) = numeric(operand) {
            return x.partial_cmp(&y);
        }
        let text = operand.as_str()?;
        return match text.trim().parse::<f64>() {
            Ok(y) => x.partial_cmp(&y),
            Err(_) => Some(Ordering::Less),
        };
    }
    let x = value.as_str()?;
    let y = text_form(operand)?;
    Some(x.cmp(y.as_str()))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        _ => compare_stored(a, b).map_or_else(|| same_value(a, b), |o| o == Ordering::Equal),
    }
}

/// Ordering between values of the same kind; `None` across kinds
fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: null first, then by kind, then by value
fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    compare_same_kind(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b)))
}

fn invalid(reason: impl Into<String>) -> QueryError {
    QueryError::InvalidValue {
        field: "filter".into(),
        reason: reason.into(),
    }
}

/// Evaluate a filter object against one document
pub fn matches(filter: &Value, doc: &Record) -> Result<bool, QueryError> {
    let Value::Object(clauses) = filter else {
        return Err(invalid("filter must be an object"));
    };
    for (key, clause) in clauses {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let parts = clause
                    .as_array()
                    .ok_or_else(|| invalid(format!("{} expects an array", key)))?;
                let mut results = Vec::with_capacity(parts.len());
                for part in parts {
                    results.push(matches(part, doc)?);
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            field => field_matches(field_value(doc, field), clause)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(value: &Value, test: &Value) -> Result<bool, QueryError> {
    let Value::Object(ops) = test else {
        // Bare value means equality
        return Ok(values_equal(value, test));
    };
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => values_equal(value, operand),
            "$ne" => !values_equal(value, operand),
            "$gt" => compare_stored(value, operand) == Some(Ordering::Greater),
            "$lt" => compare_stored(value, operand) == Some(Ordering::Less),
            "$gte" => matches!(
                compare_stored(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lte" => matches!(
                compare_stored(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" | "$nin" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| invalid(format!("{} expects an array", op)))?;
                let found = !value.is_null() && items.iter().any(|item| values_equal(value, item));
                if op == "$in" { found } else { !found }
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| invalid("$regex expects a string"))?;
                let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .dot_matches_new_line(options.contains('s'))
                    .build()
                    .map_err(|e| invalid(e.to_string()))?;
                text_form(value).is_some_and(|s| regex.is_match(&s))
            }
            "$options" => true,
            other => return Err(QueryError::Unsupported(format!("operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
impl Backend for DocumentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn execute(&self, query: &Query) -> Result<QueryOutcome, QueryError> {
        let command = document::compile(query)?;
        tracing::debug!(command = ?command, "document store");
        self.apply(command)
    }

    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), QueryError> {
        let mut collections = self.lock()?;
        let col = collections.entry(schema.name.clone()).or_default();
        for field in schema.unique_columns() {
            if !col.unique.contains(&field) {
                col.unique.push(field);
            }
        }
        self.persist(&collections)
    }

    async fn raw(&self, query: RawQuery) -> Result<QueryOutcome, QueryError> {
        match query {
            RawQuery::Document(command) => self.apply(command),
            RawQuery::Sql { .. } => Err(QueryError::Unsupported(
                "SQL statements on a document backend".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_field_is_null() {
        let d = doc(json!({ "a": 1 }));
        assert!(matches(&json!({ "b": { "$eq": null } }), &d).unwrap());
        assert!(!matches(&json!({ "b": { "$ne": null } }), &d).unwrap());
        assert!(matches(&json!({ "b": { "$nin": [1] } }), &d).unwrap());
        assert!(!matches(&json!({ "b": { "$in": [1] } }), &d).unwrap());
    }

    #[test]
    fn test_cross_type_comparisons_follow_affinity() {
        // Text value: the operand is compared as text
        let d = doc(json!({ "a": "10" }));
        assert!(!matches(&json!({ "a": { "$gt": 5 } }), &d).unwrap());
        assert!(matches(&json!({ "a": { "$gt": "1" } }), &d).unwrap());

        // Numeric value: numeric-looking text converts, other text sorts after numbers
        let d = doc(json!({ "n": 31, "flag": true }));
        assert!(matches(&json!({ "n": { "$gt": "30" } }), &d).unwrap());
        assert!(matches(&json!({ "n": { "$eq": "31" } }), &d).unwrap());
        assert!(matches(&json!({ "n": { "$lt": "abc" } }), &d).unwrap());
        assert!(matches(&json!({ "flag": { "$eq": 1 } }), &d).unwrap());
    }

    #[test]
    fn test_regex_sees_numbers_as_text() {
        let d = doc(json!({ "n": 31, "flag": false }));
        assert!(matches(&json!({ "n": { "$regex": "^3.*$" } }), &d).unwrap());
        assert!(matches(&json!({ "flag": { "$regex": "^0$" } }), &d).unwrap());
        assert!(!matches(&json!({ "missing": { "$regex": "^.*$" } }), &d).unwrap());
    }

    #[test]
    fn test_regex_options() {
        let d = doc(json!({ "name": "Alice" }));
        let f = json!({ "name": { "$regex": "^al.*$", "$options": "is" } });
        assert!(matches(&f, &d).unwrap());
        let f = json!({ "name": { "$regex": "^al.*$" } });
        assert!(!matches(&f, &d).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let d = doc(json!({ "a": 1 }));
        assert!(matches(&json!({ "a": { "$where": "1" } }), &d).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = DocumentStore::open(&path).unwrap();
            store
                .apply(DocumentCommand::Insert {
                    collection: "notes".into(),
                    document: doc(json!({ "id": "n1", "text": "hi" })),
                    ignore_conflict: false,
                })
                .unwrap();
        }
        let store = DocumentStore::open(&path).unwrap();
        let out = store
            .apply(DocumentCommand::Count {
                collection: "notes".into(),
                filter: json!({}),
            })
            .unwrap();
        assert_eq!(out.affected, 1);
    }

    #[tokio::test]
    async fn test_update_conflict_applies_nothing() {
        let store = DocumentStore::in_memory();
        store
            .ensure_schema(&TableSchema::new("users"))
            .await
            .unwrap();
        for id in ["a", "b"] {
            store
                .apply(DocumentCommand::Insert {
                    collection: "users".into(),
                    document: doc(json!({ "id": id })),
                    ignore_conflict: false,
                })
                .unwrap();
        }
        let err = store
            .apply(DocumentCommand::Update {
                collection: "users".into(),
                filter: json!({}),
                set: doc(json!({ "id": "same" })),
            })
            .unwrap_err();
        assert!(matches!(err, QueryError::DuplicateKey { .. }));
    }
}
