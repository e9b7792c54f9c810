//! Query Builder - Core builder implementation

use super::types::*;

/// Query builder for constructing database queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub(crate) query_type: QueryType,
    pub(crate) select_fields: Vec<String>,
    pub(crate) from_tables: Vec<String>,
    pub(crate) insert_table: Option<String>,
    pub(crate) update_table: Option<String>,
    pub(crate) delete_table: Option<String>,
    pub(crate) set_clauses: Vec<SetClause>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) distinct: bool,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh, unconditioned SELECT bound to `table`
    pub fn table(table: &str) -> Self {
        Self::new().from(table)
    }

    pub fn query_type(&self) -> &QueryType {
        &self.query_type
    }

    /// The table this query reads from or writes to
    pub fn target_table(&self) -> Option<&str> {
        match self.query_type {
            QueryType::Select => self.from_tables.first().map(String::as_str),
            QueryType::Insert => self.insert_table.as_deref(),
            QueryType::Update => self.update_table.as_deref(),
            QueryType::Delete => self.delete_table.as_deref(),
        }
    }

    pub fn select_fields(&self) -> &[String] {
        &self.select_fields
    }

    pub fn where_conditions(&self) -> &[WhereCondition] {
        &self.where_conditions
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn set_clauses(&self) -> &[SetClause] {
        &self.set_clauses
    }

    pub fn order_clauses(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    pub fn limit_count(&self) -> Option<i64> {
        self.limit_count
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset_value
    }

    /// True when the query was limited to exactly one row
    pub fn is_single(&self) -> bool {
        self.limit_count == Some(1)
    }

    /// True when nothing but the target table has been set
    pub fn is_unconditioned(&self) -> bool {
        self.where_conditions.is_empty()
            && self.joins.is_empty()
            && self.select_fields.is_empty()
            && self.order_by.is_empty()
            && self.limit_count.is_none()
            && self.offset_value.is_none()
    }
}
