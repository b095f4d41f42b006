//! Relational compiler: one parameter-bound statement per query.
//!
//! Identifiers are checked and quoted, every caller value becomes a bound
//! parameter. Nothing from a condition value is ever spliced into SQL text.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::builder::{Action, OnConflict, Query};
use super::condition::{quote_identifier, Conjunction, Operator, WhereCondition};
use crate::application::errors::QueryError;

/// Compiled SQL with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Convert a JSON value into a bindable SQLite value
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

struct Compiler {
    params: Vec<SqlValue>,
}

impl Compiler {
    fn bind(&mut self, value: &Value) -> String {
        self.params.push(to_sql_value(value));
        format!("?{}", self.params.len())
    }

    fn condition(&mut self, cond: &WhereCondition) -> Result<String, QueryError> {
        let column = quote_identifier(&cond.field)?;
        let sql = match cond.operator {
            // `= NULL` never matches in SQL; treat it as a null test
            Operator::Eq if cond.value.is_null() => format!("{} IS NULL", column),
            Operator::Ne if cond.value.is_null() => format!("{} IS NOT NULL", column),
            Operator::Ne => {
                let p = self.bind(&cond.value);
                format!("({} IS NULL OR {} != {})", column, column, p)
            }
            Operator::Eq | Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                let p = self.bind(&cond.value);
                format!("{} {} {}", column, cond.operator.as_sql(), p)
            }
            Operator::Like => {
                let p = self.bind(&cond.value);
                format!("{} LIKE {}", column, p)
            }
            Operator::In | Operator::NotIn => {
                let items = cond.value.as_array().map(Vec::as_slice).unwrap_or_default();
                if items.is_empty() {
                    return Ok(if cond.operator == Operator::In {
                        "0 = 1".to_string()
                    } else {
                        "1 = 1".to_string()
                    });
                }
                let placeholders: Vec<String> = items.iter().map(|v| self.bind(v)).collect();
                if cond.operator == Operator::In {
                    format!("{} IN ({})", column, placeholders.join(", "))
                } else {
                    format!(
                        "({} IS NULL OR {} NOT IN ({}))",
                        column,
                        column,
                        placeholders.join(", ")
                    )
                }
            }
            Operator::Is => format!("{} IS NULL", column),
            Operator::IsNot => format!("{} IS NOT NULL", column),
        };
        Ok(sql)
    }

    /// Left-fold the conditions: `a OR b AND c` is `(a OR b) AND c`
    fn where_clause(&mut self, conditions: &[WhereCondition]) -> Result<String, QueryError> {
        let mut expr: Option<String> = None;
        for cond in conditions {
            let atom = self.condition(cond)?;
            expr = Some(match expr {
                None => atom,
                Some(acc) => {
                    let joiner = match cond.conjunction {
                        Conjunction::And => "AND",
                        Conjunction::Or => "OR",
                    };
                    format!("({}) {} ({})", acc, joiner, atom)
                }
            });
        }
        Ok(expr.map(|e| format!(" WHERE {}", e)).unwrap_or_default())
    }
}

/// Compile a query into a single SQL statement
pub fn compile(query: &Query) -> Result<SqlStatement, QueryError> {
    query.validate()?;
    let table = quote_identifier(&query.table)?;
    let mut c = Compiler { params: Vec::new() };

    let sql = match &query.action {
        Action::Select => {
            let mut sql = format!("SELECT * FROM {}", table);
            sql.push_str(&c.where_clause(&query.conditions)?);
            if !query.order_by.is_empty() {
                let mut order = Vec::with_capacity(query.order_by.len());
                for (field, dir) in &query.order_by {
                    order.push(format!("{} {}", quote_identifier(field)?, dir.as_sql()));
                }
                sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
            }
            match (query.limit, query.offset) {
                (Some(limit), offset) => {
                    let p = c.bind(&Value::from(limit));
                    sql.push_str(&format!(" LIMIT {}", p));
                    if let Some(offset) = offset {
                        let p = c.bind(&Value::from(offset));
                        sql.push_str(&format!(" OFFSET {}", p));
                    }
                }
                (None, Some(offset)) => {
                    let p = c.bind(&Value::from(offset));
                    sql.push_str(&format!(" LIMIT -1 OFFSET {}", p));
                }
                (None, None) => {}
            }
            sql
        }
        Action::Count => {
            let mut sql = format!("SELECT COUNT(*) FROM {}", table);
            sql.push_str(&c.where_clause(&query.conditions)?);
            sql
        }
        Action::Insert {
            record,
            on_conflict,
        } => {
            let verb = match on_conflict {
                OnConflict::Fail => "INSERT",
                OnConflict::Ignore => "INSERT OR IGNORE",
            };
            if record.is_empty() {
                format!("{} INTO {} DEFAULT VALUES", verb, table)
            } else {
                let mut columns = Vec::with_capacity(record.len());
                let mut placeholders = Vec::with_capacity(record.len());
                for (key, value) in record {
                    columns.push(quote_identifier(key)?);
                    placeholders.push(c.bind(value));
                }
                format!(
                    "{} INTO {} ({}) VALUES ({})",
                    verb,
                    table,
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }
        }
        Action::Update { changes } => {
            let mut sets = Vec::with_capacity(changes.len());
            for (key, value) in changes {
                let column = quote_identifier(key)?;
                sets.push(format!("{} = {}", column, c.bind(value)));
            }
            let mut sql = format!("UPDATE {} SET {}", table, sets.join(", "));
            sql.push_str(&c.where_clause(&query.conditions)?);
            sql
        }
        Action::Delete => {
            let mut sql = format!("DELETE FROM {}", table);
            sql.push_str(&c.where_clause(&query.conditions)?);
            sql
        }
    };

    Ok(SqlStatement {
        sql,
        params: c.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::query::condition::Order;
    use serde_json::json;

    #[test]
    fn test_select_with_mixed_conjunctions() {
        let stmt = compile(
            &Query::new("users")
                .where_eq("role", "admin")
                .or_where("level", Operator::Gte, 10)
                .and_where("banned", Operator::Is, Value::Null),
        )
        .unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"users\" WHERE ((\"role\" = ?1) OR (\"level\" >= ?2)) AND (\"banned\" IS NULL)"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Text("admin".into()), SqlValue::Integer(10)]
        );
    }

    #[test]
    fn test_values_never_reach_sql_text() {
        let hostile = "x'; DROP TABLE users; --";
        let stmt = compile(&Query::new("users").where_eq("name", hostile)).unwrap();
        assert!(!stmt.sql.contains("DROP"));
        assert_eq!(stmt.params, vec![SqlValue::Text(hostile.into())]);
    }

    #[test]
    fn test_in_expands_placeholders() {
        let stmt = compile(&Query::new("t").and_where("id", Operator::In, json!([1, 2, 3]))).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"t\" WHERE \"id\" IN (?1, ?2, ?3)");
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let stmt = compile(&Query::new("t").and_where("id", Operator::In, json!([]))).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM \"t\" WHERE 0 = 1");
    }

    #[test]
    fn test_pagination_binds_limit_and_offset() {
        let stmt = compile(
            &Query::new("t")
                .order_by("score", Order::Desc)
                .limit(5)
                .offset(10),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"t\" ORDER BY \"score\" DESC LIMIT ?1 OFFSET ?2"
        );
        assert_eq!(stmt.params, vec![SqlValue::Integer(5), SqlValue::Integer(10)]);
    }

    #[test]
    fn test_insert_ignore_and_update() {
        let mut record = serde_json::Map::new();
        record.insert("id".into(), json!("a"));
        record.insert("active".into(), json!(true));

        let insert = compile(&Query::new("t").insert_ignore(record.clone())).unwrap();
        assert_eq!(
            insert.sql,
            "INSERT OR IGNORE INTO \"t\" (\"active\", \"id\") VALUES (?1, ?2)"
        );
        assert_eq!(insert.params[0], SqlValue::Integer(1));

        let update = compile(&Query::new("t").where_eq("id", "a").update(record)).unwrap();
        assert_eq!(
            update.sql,
            "UPDATE \"t\" SET \"active\" = ?1, \"id\" = ?2 WHERE \"id\" = ?3"
        );
    }
}
