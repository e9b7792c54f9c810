//! Query Builder DML operations (INSERT, UPDATE, DELETE)

use super::builder::QueryBuilder;
use super::types::*;
use serde_json::Value;

impl QueryBuilder {
    /// Start an INSERT query
    pub fn insert_into(mut self, table: &str) -> Self {
        self.query_type = QueryType::Insert;
        self.insert_table = Some(table.to_string());
        self
    }

    /// Turn this query into an UPDATE of `table`, keeping its WHERE clauses
    pub fn update(mut self, table: &str) -> Self {
        self.query_type = QueryType::Update;
        self.update_table = Some(table.to_string());
        self
    }

    /// Turn this query into a DELETE from `table`, keeping its WHERE clauses
    pub fn delete_from(mut self, table: &str) -> Self {
        self.query_type = QueryType::Delete;
        self.delete_table = Some(table.to_string());
        self
    }

    /// Set a column value (for INSERT/UPDATE); JSON null becomes SQL NULL
    pub fn set<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        let value = match value.into() {
            Value::Null => None,
            other => Some(other),
        };
        self.set_clauses.push(SetClause {
            column: column.to_string(),
            value,
        });
        self
    }

    /// Set a column to NULL (for INSERT/UPDATE)
    pub fn set_null(mut self, column: &str) -> Self {
        self.set_clauses.push(SetClause {
            column: column.to_string(),
            value: None,
        });
        self
    }

    /// Set multiple values at once
    pub fn set_values<I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        values
            .into_iter()
            .fold(self, |query, (column, value)| query.set(&column, value))
    }
}
