//! PostgreSQL Backend Implementation
//!
//! Runs builder queries through a sqlx `PgPool`. Parameters come from
//! [`QueryBuilder::to_sql_with_params`] and result rows are converted to
//! JSON objects column by column.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as SqlxRow, TypeInfo};

use super::core::{DatabaseBackendType, QueryExecutor};
use crate::collection::Row;
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::QueryBuilder;

/// PostgreSQL executor backed by a connection pool
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool using the connection settings of `config`
    pub async fn connect(config: &OrmConfig) -> OrmResult<Self> {
        let database_url = config.require_database_url()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(database_url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        tracing::info!(
            "Connected to PostgreSQL (max_connections={}, min_connections={})",
            config.max_connections,
            config.min_connections
        );

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare<'q>(sql: &'q str, params: &[Value]) -> OrmResult<Query<'q, Postgres, PgArguments>> {
        params
            .iter()
            .try_fold(sqlx::query(sql), |query, param| bind_json_value(query, param))
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn fetch_all(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params();
        let rows = Self::prepare(&sql, &params)?
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrmError::Database(format!("Query fetch failed: {}", e)))?;

        rows.iter().map(row_to_json).collect()
    }

    async fn execute(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.to_sql_with_params();
        let result = Self::prepare(&sql, &params)?
            .execute(&self.pool)
            .await
            .map_err(|e| OrmError::Database(format!("Query execution failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn insert(&self, query: &QueryBuilder, primary_key: &str) -> OrmResult<Option<Value>> {
        let (sql, params) = query.to_sql_with_params();
        let sql = format!("{} RETURNING {}", sql, primary_key);
        let row = Self::prepare(&sql, &params)?
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrmError::Database(format!("Insert failed: {}", e)))?;

        match row {
            Some(row) => Ok(row_to_json(&row)?.remove(primary_key)),
            None => Ok(None),
        }
    }

    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.clone().without_window().to_sql_with_params();
        let sql = format!("SELECT COUNT(*) AS aggregate FROM ({}) AS counted", sql);
        let row = Self::prepare(&sql, &params)?
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OrmError::Database(format!("Count failed: {}", e)))?;

        let total: i64 = row
            .try_get("aggregate")
            .map_err(|e| OrmError::Database(format!("Failed to read count: {}", e)))?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }
}

/// Bind a JSON parameter to a sqlx query
fn bind_json_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> OrmResult<Query<'q, Postgres, PgArguments>> {
    match value {
        Value::Null => Ok(query.bind(Option::<String>::None)),
        Value::Bool(b) => Ok(query.bind(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(query.bind(i))
            } else if let Some(f) = n.as_f64() {
                Ok(query.bind(f))
            } else {
                Err(OrmError::Query(format!("Unsupported numeric parameter {}", n)))
            }
        }
        Value::String(s) => Ok(query.bind(s.clone())),
        Value::Array(_) | Value::Object(_) => Ok(query.bind(value.clone())),
    }
}

/// Convert a PostgreSQL row into a JSON object
fn row_to_json(row: &PgRow) -> OrmResult<Row> {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_to_json(row, index)?);
    }
    Ok(map)
}

fn column_to_json(row: &PgRow, index: usize) -> OrmResult<Value> {
    let type_name = row.columns()[index].type_info().name().to_string();
    let err = |e: sqlx::Error| OrmError::Database(format!("Failed to decode {} column: {}", type_name, e));

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(err)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index).map_err(err)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index).map_err(err)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index).map_err(err)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map_err(err)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(err)?.map(Value::from),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(err)?
            .map(|dt| Value::from(dt.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map_err(err)?
            .map(|dt| Value::from(dt.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map_err(err)?
            .map(|d| Value::from(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index).map_err(err)?,
        _ => row.try_get::<Option<String>, _>(index).map_err(err)?.map(Value::from),
    };

    Ok(value.unwrap_or(Value::Null))
}
