//! In-memory Backend Implementation
//!
//! Evaluates [`QueryBuilder`] values directly against tables of JSON rows.
//! Covers what the model layer generates: where operators on plain or
//! qualified columns, inner and left joins, `table.*` and aliased projections,
//! ordering, limit/offset and the three DML statements. Every executed query
//! is logged as inlined SQL, and tables can be switched into a failing state
//! to simulate upstream errors.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::core::{DatabaseBackendType, QueryExecutor};
use crate::collection::{match_key, Row};
use crate::error::{OrmError, OrmResult};
use crate::query::{JoinType, OrderDirection, QueryBuilder, QueryOperator, QueryType, WhereCondition};

/// One joined result row: each participating table with its row, if matched
type Joined<'a> = Vec<(&'a str, Option<&'a Row>)>;

/// In-process storage double
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    executed: Mutex<Vec<String>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryBackend::seed`]
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        self.seed(table, rows);
        self
    }

    /// Append rows to `table`; non-object values are ignored
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let rows = rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        });
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().extend(rows);
        }
    }

    /// Snapshot of every row currently stored in `table`
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).cloned())
            .unwrap_or_default()
    }

    /// SQL of every query executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn clear_log(&self) {
        if let Ok(mut log) = self.executed.lock() {
            log.clear();
        }
    }

    /// Make every query touching `table` fail with a database error
    pub fn fail_on(&self, table: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(table.to_string());
        }
    }

    pub fn recover(&self, table: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.remove(table);
        }
    }

    fn record(&self, query: &QueryBuilder) -> OrmResult<()> {
        let sql = query.to_sql();
        tracing::trace!("memory backend executing: {}", sql);
        self.executed.lock().map_err(|_| poisoned())?.push(sql);

        let failing = self.failing.read().map_err(|_| poisoned())?;
        let touched = query
            .target_table()
            .into_iter()
            .chain(query.joins().iter().map(|join| join.table.as_str()));
        for table in touched {
            if failing.contains(table) {
                return Err(OrmError::Database(format!(
                    "simulated failure on table '{}'",
                    table
                )));
            }
        }
        Ok(())
    }

    fn select(&self, query: &QueryBuilder, windowed: bool) -> OrmResult<Vec<Row>> {
        let table = query
            .target_table()
            .ok_or_else(|| OrmError::Query("SELECT without a FROM table".to_string()))?;
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let empty = Vec::new();
        let base = tables.get(table).unwrap_or(&empty);

        let mut joined: Vec<Joined<'_>> = base.iter().map(|row| vec![(table, Some(row))]).collect();

        for join in query.joins() {
            let candidates = tables.get(&join.table).unwrap_or(&empty);
            let mut next = Vec::new();
            for combined in joined {
                let mut matched = false;
                for candidate in candidates {
                    let mut combined_row = combined.clone();
                    combined_row.push((join.table.as_str(), Some(candidate)));
                    let on = join.on_conditions.iter().all(|(left, right)| {
                        values_equal(&resolve(&combined_row, left), &resolve(&combined_row, right))
                    });
                    if on {
                        matched = true;
                        next.push(combined_row);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut combined_row = combined;
                    combined_row.push((join.table.as_str(), None));
                    next.push(combined_row);
                }
            }
            joined = next;
        }

        joined.retain(|row| query.where_conditions().iter().all(|c| condition_holds(row, c)));

        if windowed {
            let order = query.order_clauses();
            if !order.is_empty() {
                joined.sort_by(|a, b| {
                    order
                        .iter()
                        .map(|(column, direction)| {
                            let ordering = compare_values(&resolve(a, column), &resolve(b, column));
                            match direction {
                                OrderDirection::Asc => ordering,
                                OrderDirection::Desc => ordering.reverse(),
                            }
                        })
                        .find(|ordering| *ordering != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
            }

            let offset = query.offset_value().unwrap_or(0).max(0) as usize;
            let limit = query.limit_count().map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
            joined = joined.into_iter().skip(offset).take(limit).collect();
        }

        let mut rows: Vec<Row> = joined.iter().map(|row| project(row, query.select_fields())).collect();
        if query.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(Value::Object(row.clone()).to_string()));
        }
        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for MemoryBackend {
    async fn fetch_all(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        self.record(query)?;
        self.select(query, true)
    }

    async fn execute(&self, query: &QueryBuilder) -> OrmResult<u64> {
        self.record(query)?;
        let table = query
            .target_table()
            .ok_or_else(|| OrmError::Query("statement without a target table".to_string()))?
            .to_string();
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(table.clone()).or_default();
        let matches = |row: &Row| {
            let joined: Joined<'_> = vec![(table.as_str(), Some(row))];
            query.where_conditions().iter().all(|c| condition_holds(&joined, c))
        };

        match query.query_type() {
            QueryType::Update => {
                let mut affected = 0;
                for row in rows.iter_mut().filter(|row| matches(&**row)) {
                    for clause in query.set_clauses() {
                        row.insert(
                            clause.column.clone(),
                            clause.value.clone().unwrap_or(Value::Null),
                        );
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            QueryType::Delete => {
                let before = rows.len();
                rows.retain(|row| !matches(row));
                Ok((before - rows.len()) as u64)
            }
            other => Err(OrmError::Query(format!(
                "execute expects UPDATE or DELETE, got {:?}",
                other
            ))),
        }
    }

    async fn insert(&self, query: &QueryBuilder, primary_key: &str) -> OrmResult<Option<Value>> {
        self.record(query)?;
        let table = query
            .target_table()
            .ok_or_else(|| OrmError::Query("INSERT without a target table".to_string()))?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(table.to_string()).or_default();

        let mut row: Row = query
            .set_clauses()
            .iter()
            .map(|clause| (clause.column.clone(), clause.value.clone().unwrap_or(Value::Null)))
            .collect();

        let existing = row.get(primary_key).filter(|value| !value.is_null()).cloned();
        let key = match existing {
            Some(value) => value,
            None => {
                let next = rows
                    .iter()
                    .filter_map(|r| r.get(primary_key).and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                let next = Value::from(next);
                row.insert(primary_key.to_string(), next.clone());
                next
            }
        };

        rows.push(row);
        Ok(Some(key))
    }

    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64> {
        self.record(query)?;
        Ok(self.select(query, false)?.len() as u64)
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::Memory
    }
}

fn poisoned() -> OrmError {
    OrmError::Database("memory backend lock poisoned".to_string())
}

/// Look up `column` (`col` or `table.col`) in a joined row; missing is null
fn resolve(row: &Joined<'_>, column: &str) -> Value {
    match column.split_once('.') {
        Some((table, field)) => row
            .iter()
            .find(|(name, _)| *name == table)
            .and_then(|(_, r)| r.and_then(|r| r.get(field)))
            .cloned()
            .unwrap_or(Value::Null),
        None => row
            .iter()
            .find_map(|(_, r)| r.and_then(|r| r.get(column)))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn project(row: &Joined<'_>, fields: &[String]) -> Row {
    let mut out = Row::new();
    if fields.is_empty() {
        extend_missing(&mut out, row.iter().filter_map(|(_, r)| *r));
        return out;
    }

    for field in fields {
        let field = field.trim();
        if field == "*" {
            extend_missing(&mut out, row.iter().filter_map(|(_, r)| *r));
        } else if let Some(table) = field.strip_suffix(".*") {
            let tables = row.iter().filter(|(name, _)| *name == table).filter_map(|(_, r)| *r);
            extend_missing(&mut out, tables);
        } else {
            let (expression, alias) = split_alias(field);
            let key = alias.unwrap_or_else(|| expression.rsplit('.').next().unwrap_or(expression));
            out.insert(key.to_string(), resolve(row, expression));
        }
    }
    out
}

fn extend_missing<'a>(out: &mut Row, rows: impl Iterator<Item = &'a Row>) {
    for row in rows {
        for (key, value) in row {
            if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Split `expr as alias`
fn split_alias(field: &str) -> (&str, Option<&str>) {
    match field.find(" as ").or_else(|| field.find(" AS ")) {
        Some(at) => (field[..at].trim(), Some(field[at + 4..].trim())),
        None => (field, None),
    }
}

fn condition_holds(row: &Joined<'_>, condition: &WhereCondition) -> bool {
    let actual = resolve(row, &condition.column);
    let expected = condition.value.as_ref().unwrap_or(&Value::Null);

    match condition.operator {
        QueryOperator::Equal => values_equal(&actual, expected),
        QueryOperator::NotEqual => !actual.is_null() && !expected.is_null() && !values_equal(&actual, expected),
        QueryOperator::GreaterThan => ordered(&actual, expected, |o| o == Ordering::Greater),
        QueryOperator::GreaterThanOrEqual => ordered(&actual, expected, |o| o != Ordering::Less),
        QueryOperator::LessThan => ordered(&actual, expected, |o| o == Ordering::Less),
        QueryOperator::LessThanOrEqual => ordered(&actual, expected, |o| o != Ordering::Greater),
        QueryOperator::Like => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        QueryOperator::In => condition.values.iter().any(|v| values_equal(&actual, v)),
        QueryOperator::NotIn => !actual.is_null() && !condition.values.iter().any(|v| values_equal(&actual, v)),
        QueryOperator::IsNull => actual.is_null(),
        QueryOperator::IsNotNull => !actual.is_null(),
    }
}

/// SQL equality: null equals nothing, `5` equals `"5"`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (match_key(a), match_key(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn ordered(a: &Value, b: &Value, test: impl Fn(Ordering) -> bool) -> bool {
    !a.is_null() && !b.is_null() && test(compare_values(a, b))
}

/// Total order used for sorting: nulls first, numbers numerically, the rest as strings
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => match_key(a).cmp(&match_key(b)),
    }
}

/// `%` matches any run of characters, `_` exactly one
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_from(&text, &pattern)
}

fn like_from(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_from(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_from(&text[1..], rest),
    }
}
