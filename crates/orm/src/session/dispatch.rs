//! Query Dispatch - Terminal operations of a [`ModelQuery`]
//!
//! Every terminal call runs the same pipeline, in this order:
//!
//! 1. soft-delete predicate on `table.deleted_at` unless `with_trashed`
//! 2. projection of `table.*` plus requested pivot columns when a pivot is traversed
//! 3. execution
//! 4. single-row unwrap for sessions limited to one row
//! 5. visibility (`visible` whitelist, else `hidden` removal)
//! 6. getter mutation
//! 7. eager loading and attachment
//! 8. session reset, on success and on failure
//!
//! Eager-load keys are read from the rows as fetched, before visibility.

use serde_json::Value;

use super::ModelQuery;
use crate::collection::{match_key, Collection, Fetched, Paginated, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, PIVOT_PREFIX};
use crate::query::pagination::page_offset;
use crate::query::QueryBuilder;
use crate::relationships::resolver;

impl ModelQuery {
    /// Run the session; a `limit 1` session yields a single row
    pub async fn fetch(&mut self) -> ModelResult<Fetched> {
        let single = self.session.is_single();
        let outcome = self.run(single).await;
        self.reset();
        outcome
    }

    /// Every row matching the session, as a collection
    pub async fn all(&mut self) -> ModelResult<Collection> {
        let outcome = self.run(false).await.map(Fetched::into_collection);
        self.reset();
        outcome
    }

    /// First row matching the session
    pub async fn first(&mut self) -> ModelResult<Option<Row>> {
        self.constrain(|q| q.limit(1));
        let outcome = self.run(true).await.map(Fetched::into_one);
        self.reset();
        outcome
    }

    /// Row with primary key `key`, hydrated as a model instance.
    ///
    /// Resolves to `None` when nothing matches, including rows that are
    /// soft-deleted unless `with_trashed` was set.
    pub async fn find<K: Into<Value>>(&mut self, key: K) -> ModelResult<Option<Model>> {
        let key = key.into();
        let column = self.definition.qualified_primary_key();
        let lookup = key.clone();
        self.constrain(|q| q.where_eq(&column, lookup).limit(1));

        let outcome = self.run(true).await.map(|fetched| {
            fetched
                .into_one()
                .map(|row| Model::hydrate(self.db.clone(), self.definition.clone(), row, key))
        });
        self.reset();
        outcome
    }

    /// One page of results plus pagination metadata
    pub async fn paginate(&mut self, page: u64, per_page: u64) -> ModelResult<Paginated> {
        let outcome = self.paginate_session(page, per_page).await;
        self.reset();
        outcome
    }

    async fn paginate_session(&mut self, page: u64, per_page: u64) -> ModelResult<Paginated> {
        if page == 0 {
            return Err(ModelError::InvalidArgument("page must be at least 1".to_string()));
        }
        if per_page == 0 {
            return Err(ModelError::InvalidArgument("per_page must be at least 1".to_string()));
        }

        let offset = window_value(page_offset(page, per_page))?;
        let limit = window_value(per_page)?;

        let counted = self.prepared();
        let total = self
            .db
            .executor()
            .count(&counted)
            .await
            .inspect_err(|e| tracing::warn!("Count on {} failed: {}", self.definition.table(), e))?;

        self.constrain(|q| q.offset(offset).limit(limit));
        let data = self.run(false).await?.into_collection();

        Ok(Paginated::new(total, page, per_page, data))
    }

    /// Builder with the soft-delete predicate and pivot projection applied
    pub(crate) fn prepared(&self) -> QueryBuilder {
        let table = self.definition.table();
        let mut query = self.session.clone();

        if !self.with_trashed {
            if let Some(column) = self.definition.soft_delete_column() {
                query = query.where_null(&format!("{}.{}", table, column));
            }
        }

        if let Some(pivot) = &self.pivot {
            if query.select_fields().is_empty() {
                query = query.select(&format!("{}.*", table));
            }
            for column in &self.pivot_columns {
                query = query.select_raw(&format!(
                    "{}.{} as {}{}",
                    pivot.table, column, PIVOT_PREFIX, column
                ));
            }
        }

        query
    }

    /// `all()` plus the canonical value of `column` on each row as fetched.
    ///
    /// Eager attachment pairs rows through these keys, so a key column the
    /// related model hides still matches.
    pub(crate) async fn all_keyed(&mut self, column: &str) -> ModelResult<(Collection, Vec<Option<String>>)> {
        let outcome = self
            .run_keyed(false, Some(column))
            .await
            .map(|(fetched, keys)| (fetched.into_collection(), keys));
        self.reset();
        outcome
    }

    async fn run(&self, single: bool) -> ModelResult<Fetched> {
        self.run_keyed(single, None).await.map(|(fetched, _)| fetched)
    }

    async fn run_keyed(&self, single: bool, key_column: Option<&str>) -> ModelResult<(Fetched, Vec<Option<String>>)> {
        let table = self.definition.table();
        let query = self.prepared();
        tracing::debug!("Dispatching query on {}: {}", table, query.to_sql());

        let rows = self
            .db
            .executor()
            .fetch_all(&query)
            .await
            .inspect_err(|e| tracing::warn!("Query on {} failed: {}", table, e))?;

        let mut fetched = Fetched::from_rows(rows, single);
        let keys = match key_column {
            Some(column) => fetched
                .rows_mut()
                .iter()
                .map(|row| row.get(column).and_then(match_key))
                .collect(),
            None => Vec::new(),
        };
        let plans = if self.eager.is_empty() || fetched.is_empty() {
            Vec::new()
        } else {
            resolver::plan_eager(&self.db, &self.definition, fetched.rows_mut(), &self.eager, &self.nested_scopes)?
        };

        for row in fetched.rows_mut() {
            self.definition.apply_visibility(row);
        }
        for row in fetched.rows_mut() {
            self.definition.apply_getters(row);
        }

        if !plans.is_empty() {
            tracing::debug!("Eager loading [{}] for {} {} row(s)", self.eager.join(", "), fetched.len(), table);
            resolver::load_eager(&self.db, plans, fetched.rows_mut()).await?;
        }

        Ok((fetched, keys))
    }
}

fn window_value(value: u64) -> ModelResult<i64> {
    i64::try_from(value).map_err(|_| ModelError::InvalidArgument(format!("page window {} is out of range", value)))
}
