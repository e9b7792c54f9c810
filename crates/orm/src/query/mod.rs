//! Query Builder Module - Fluent builder the model layer drives
//!
//! The builder only collects clauses; rendering lives in `sql_generation`
//! and execution belongs to a [`crate::backends::QueryExecutor`].

pub mod builder;
pub mod dml;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use types::{JoinClause, JoinType, OrderDirection, QueryOperator, QueryType, SetClause, WhereCondition};
