//! Query Builder SQL generation
//!
//! `to_sql_with_params` renders `$n` placeholders for executors that bind
//! parameters; `to_sql` inlines literals and is meant for logs and tests.

use serde_json::Value;
use super::builder::QueryBuilder;
use super::types::*;

/// Parameter sink used while rendering; either binds or inlines values
struct Render<'a> {
    sql: String,
    params: &'a mut Vec<Value>,
    inline: bool,
}

impl Render<'_> {
    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn value(&mut self, value: &Value) {
        if self.inline {
            let literal = inline_literal(value);
            self.sql.push_str(&literal);
        } else {
            self.params.push(value.clone());
            let placeholder = format!("${}", self.params.len());
            self.sql.push_str(&placeholder);
        }
    }
}

/// SQL literal for a JSON value, with single quotes escaped
pub fn inline_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

impl QueryBuilder {
    /// Generate SQL with parameter placeholders and return the parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.render(&mut params, false);
        (sql, params)
    }

    /// Convert the query to SQL with literals inlined
    pub fn to_sql(&self) -> String {
        let mut params = Vec::new();
        self.render(&mut params, true)
    }

    fn render(&self, params: &mut Vec<Value>, inline: bool) -> String {
        let mut out = Render { sql: String::new(), params, inline };
        match self.query_type {
            QueryType::Select => self.build_select_sql(&mut out),
            QueryType::Insert => self.build_insert_sql(&mut out),
            QueryType::Update => self.build_update_sql(&mut out),
            QueryType::Delete => self.build_delete_sql(&mut out),
        }
        out.sql
    }

    fn build_select_sql(&self, out: &mut Render<'_>) {
        if self.distinct {
            out.push("SELECT DISTINCT ");
        } else {
            out.push("SELECT ");
        }

        if self.select_fields.is_empty() {
            out.push("*");
        } else {
            out.push(&self.select_fields.join(", "));
        }

        if !self.from_tables.is_empty() {
            out.push(" FROM ");
            out.push(&self.from_tables.join(", "));
        }

        for join in &self.joins {
            out.push(&format!(" {} {}", join.join_type, join.table));
            if !join.on_conditions.is_empty() {
                let conditions: Vec<String> = join
                    .on_conditions
                    .iter()
                    .map(|(left, right)| format!("{} = {}", left, right))
                    .collect();
                out.push(" ON ");
                out.push(&conditions.join(" AND "));
            }
        }

        self.build_where_clause(out);
        self.build_order_limit_clause(out);
    }

    fn build_insert_sql(&self, out: &mut Render<'_>) {
        let Some(table) = &self.insert_table else {
            return;
        };
        out.push(&format!("INSERT INTO {}", table));

        if self.set_clauses.is_empty() {
            out.push(" DEFAULT VALUES");
            return;
        }

        let columns: Vec<&str> = self.set_clauses.iter().map(|c| c.column.as_str()).collect();
        out.push(&format!(" ({}) VALUES (", columns.join(", ")));
        for (i, clause) in self.set_clauses.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            match &clause.value {
                Some(value) => out.value(value),
                None => out.push("NULL"),
            }
        }
        out.push(")");
    }

    fn build_update_sql(&self, out: &mut Render<'_>) {
        let Some(table) = &self.update_table else {
            return;
        };
        out.push(&format!("UPDATE {}", table));

        if !self.set_clauses.is_empty() {
            out.push(" SET ");
            for (i, clause) in self.set_clauses.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                out.push(&format!("{} = ", clause.column));
                match &clause.value {
                    Some(value) => out.value(value),
                    None => out.push("NULL"),
                }
            }
        }

        self.build_where_clause(out);
    }

    fn build_delete_sql(&self, out: &mut Render<'_>) {
        let Some(table) = &self.delete_table else {
            return;
        };
        out.push(&format!("DELETE FROM {}", table));
        self.build_where_clause(out);
    }

    fn build_where_clause(&self, out: &mut Render<'_>) {
        if self.where_conditions.is_empty() {
            return;
        }

        out.push(" WHERE ");
        for (i, condition) in self.where_conditions.iter().enumerate() {
            if i > 0 {
                out.push(" AND ");
            }

            // An empty IN list can never match; NOT IN () always does
            if condition.values.is_empty() {
                match condition.operator {
                    QueryOperator::In => {
                        out.push("1 = 0");
                        continue;
                    }
                    QueryOperator::NotIn => {
                        out.push("1 = 1");
                        continue;
                    }
                    _ => {}
                }
            }

            out.push(&condition.column);
            out.push(" ");

            match condition.operator {
                QueryOperator::In | QueryOperator::NotIn => {
                    out.push(&condition.operator.to_string());
                    out.push(" (");
                    for (j, value) in condition.values.iter().enumerate() {
                        if j > 0 {
                            out.push(", ");
                        }
                        out.value(value);
                    }
                    out.push(")");
                }
                QueryOperator::IsNull | QueryOperator::IsNotNull => {
                    out.push(&condition.operator.to_string());
                }
                _ => {
                    out.push(&condition.operator.to_string());
                    if let Some(ref value) = condition.value {
                        out.push(" ");
                        out.value(value);
                    }
                }
            }
        }
    }

    fn build_order_limit_clause(&self, out: &mut Render<'_>) {
        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            out.push(" ORDER BY ");
            out.push(&order.join(", "));
        }

        if let Some(limit) = self.limit_count {
            out.push(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            out.push(&format!(" OFFSET {}", offset));
        }
    }
}
