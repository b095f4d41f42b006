//! Filter conditions shared by both compilers

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use std::fmt;

use crate::application::errors::QueryError;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let op = match s.trim().to_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Gte,
            "<=" => Operator::Lte,
            "LIKE" => Operator::Like,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a condition joins the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// One `where` clause
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    pub conjunction: Conjunction,
}

impl WhereCondition {
    /// Check the operator/value pairing before either compiler sees it
    pub fn validate(&self) -> Result<(), QueryError> {
        check_identifier(&self.field)?;
        let invalid = |reason: &str| QueryError::InvalidValue {
            field: self.field.clone(),
            reason: reason.to_string(),
        };
        match self.operator {
            Operator::In | Operator::NotIn => {
                let items = self
                    .value
                    .as_array()
                    .ok_or_else(|| invalid("IN expects an array"))?;
                if items.iter().any(|v| v.is_array() || v.is_object()) {
                    return Err(invalid("IN items must be scalars"));
                }
                // SQL turns `x NOT IN (NULL, ..)` into unknown for every row
                if items.iter().any(Value::is_null) {
                    return Err(invalid("IN items must not be null; use IS NULL"));
                }
            }
            Operator::Is | Operator::IsNot => {
                if !self.value.is_null() {
                    return Err(invalid("IS only compares against null"));
                }
            }
            Operator::Like => {
                if !self.value.is_string() {
                    return Err(invalid("LIKE expects a string pattern"));
                }
            }
            _ => {
                if self.value.is_array() || self.value.is_object() {
                    return Err(invalid("comparison expects a scalar"));
                }
            }
        }
        Ok(())
    }
}

/// Ensure a table or column name is a plain identifier
pub fn check_identifier(name: &str) -> Result<(), QueryError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote a checked identifier for SQL
pub fn quote_identifier(name: &str) -> Result<String, QueryError> {
    check_identifier(name)?;
    Ok(format!("\"{}\"", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: Operator, value: Value) -> WhereCondition {
        WhereCondition {
            field: field.into(),
            operator,
            value,
            conjunction: Conjunction::And,
        }
    }

    #[test]
    fn test_identifier_rules() {
        assert!(check_identifier("user_id").is_ok());
        assert!(check_identifier("_x1").is_ok());
        assert!(check_identifier("1x").is_err());
        assert!(check_identifier("name; DROP TABLE users").is_err());
        assert!(check_identifier("a\"b").is_err());
        assert!(check_identifier("").is_err());
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("not in"), Some(Operator::NotIn));
        assert_eq!(Operator::parse(" IS NOT "), Some(Operator::IsNot));
        assert_eq!(Operator::parse("~"), None);
    }

    #[test]
    fn test_value_shape_validation() {
        assert!(cond("a", Operator::In, json!([1, 2])).validate().is_ok());
        assert!(cond("a", Operator::In, json!(1)).validate().is_err());
        assert!(cond("a", Operator::NotIn, json!([null, "x"])).validate().is_err());
        assert!(cond("a", Operator::Is, json!(null)).validate().is_ok());
        assert!(cond("a", Operator::Is, json!(3)).validate().is_err());
        assert!(cond("a", Operator::Like, json!(3)).validate().is_err());
        assert!(cond("a", Operator::Eq, json!({"$gt": 1})).validate().is_err());
    }
}
