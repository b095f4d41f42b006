//! Query DSL - one builder, two compiler targets
//!
//! `Query` collects conditions, ordering, paging and an action. The `sql`
//! compiler turns it into a parameter-bound statement, the `document`
//! compiler into a filter object for a document store.

pub mod builder;
pub mod condition;
pub mod document;
pub mod sql;

pub use builder::{Action, OnConflict, Query, QueryOutcome, Record};
pub use condition::{Conjunction, Operator, Order, WhereCondition};
pub use document::DocumentCommand;
pub use sql::SqlStatement;
