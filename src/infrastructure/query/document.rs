//! Document-store compiler: conditions become filter objects.
//!
//! Filters use the familiar `$eq` / `$in` / `$regex` / `$and` / `$or`
//! vocabulary. Values are only ever placed under an operator key, and
//! condition values are validated to be scalars, so a value can never turn
//! into an operator.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::builder::{Action, OnConflict, Query, Record};
use super::condition::{Conjunction, Operator, Order, WhereCondition};
use crate::application::errors::QueryError;

/// A compiled document-store operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentCommand {
    Find {
        collection: String,
        filter: Value,
        /// Field and direction, `1` ascending, `-1` descending
        sort: Vec<(String, i8)>,
        skip: Option<u64>,
        limit: Option<u64>,
    },
    Count {
        collection: String,
        filter: Value,
    },
    Insert {
        collection: String,
        document: Record,
        ignore_conflict: bool,
    },
    Update {
        collection: String,
        filter: Value,
        set: Record,
    },
    Delete {
        collection: String,
        filter: Value,
    },
}

const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Translate a LIKE pattern into an anchored regex.
///
/// `%` matches any run of characters and `_` exactly one; everything else
/// is literal.
pub fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c if REGEX_META.contains(&c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex
}

fn condition(cond: &WhereCondition) -> Value {
    let test = match cond.operator {
        Operator::Eq | Operator::Is => json!({ "$eq": cond.value }),
        Operator::Ne | Operator::IsNot => json!({ "$ne": cond.value }),
        Operator::Gt => json!({ "$gt": cond.value }),
        Operator::Lt => json!({ "$lt": cond.value }),
        Operator::Gte => json!({ "$gte": cond.value }),
        Operator::Lte => json!({ "$lte": cond.value }),
        Operator::In => json!({ "$in": cond.value }),
        Operator::NotIn => json!({ "$nin": cond.value }),
        Operator::Like => {
            let pattern = cond.value.as_str().unwrap_or_default();
            json!({ "$regex": like_to_regex(pattern), "$options": "is" })
        }
    };
    let mut filter = Map::new();
    filter.insert(cond.field.clone(), test);
    Value::Object(filter)
}

fn combine(key: &str, acc: Value, next: Value) -> Value {
    // Flatten runs of the same conjunction
    let items = match acc {
        Value::Object(mut map) if map.len() == 1 && map.get(key).is_some_and(Value::is_array) => {
            let mut items = match map.remove(key) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            items.push(next);
            items
        }
        acc => vec![acc, next],
    };
    let mut combined = Map::new();
    combined.insert(key.to_string(), Value::Array(items));
    Value::Object(combined)
}

/// Compile conditions into one filter object, folding left like the SQL compiler
pub fn compile_filter(conditions: &[WhereCondition]) -> Result<Value, QueryError> {
    let mut filter: Option<Value> = None;
    for cond in conditions {
        cond.validate()?;
        let atom = condition(cond);
        filter = Some(match filter {
            None => atom,
            Some(acc) => match cond.conjunction {
                Conjunction::And => combine("$and", acc, atom),
                Conjunction::Or => combine("$or", acc, atom),
            },
        });
    }
    Ok(filter.unwrap_or_else(|| json!({})))
}

/// Compile a full query
pub fn compile(query: &Query) -> Result<DocumentCommand, QueryError> {
    query.validate()?;
    let collection = query.table.clone();
    let filter = compile_filter(&query.conditions)?;

    let command = match &query.action {
        Action::Select => DocumentCommand::Find {
            collection,
            filter,
            sort: query
                .order_by
                .iter()
                .map(|(field, order)| {
                    let dir = match order {
                        Order::Asc => 1,
                        Order::Desc => -1,
                    };
                    (field.clone(), dir)
                })
                .collect(),
            skip: query.offset,
            limit: query.limit,
        },
        Action::Count => DocumentCommand::Count { collection, filter },
        Action::Insert {
            record,
            on_conflict,
        } => DocumentCommand::Insert {
            collection,
            document: record.clone(),
            ignore_conflict: *on_conflict == OnConflict::Ignore,
        },
        Action::Update { changes } => DocumentCommand::Update {
            collection,
            filter,
            set: changes.clone(),
        },
        Action::Delete => DocumentCommand::Delete { collection, filter },
    };
    Ok(command)
}
