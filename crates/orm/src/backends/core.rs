//! Core Database Backend Trait
//!
//! The model layer never talks to a driver directly. Every terminal
//! operation hands a finished [`QueryBuilder`] to a [`QueryExecutor`], which
//! runs it and returns rows as JSON objects.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::collection::Row;
use crate::error::OrmResult;
use crate::query::QueryBuilder;

/// Storage collaborator that executes built queries
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a SELECT and return every resulting row
    async fn fetch_all(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>>;

    /// Execute an UPDATE or DELETE and return the affected row count
    async fn execute(&self, query: &QueryBuilder) -> OrmResult<u64>;

    /// Execute an INSERT and return the value of `primary_key` on the new row, if any
    async fn insert(&self, query: &QueryBuilder, primary_key: &str) -> OrmResult<Option<Value>>;

    /// Count the rows a SELECT would return, ignoring its limit and offset
    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64>;

    /// Backend name used in logs
    fn backend_type(&self) -> DatabaseBackendType;
}

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    Memory,
}

impl fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::Memory => write!(f, "memory"),
        }
    }
}
