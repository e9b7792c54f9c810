//! Relation Resolver - Turns declarations into constrained queries
//!
//! Keys a declaration leaves open are filled from naming conventions:
//!
//! | kind            | target key (host)      | relation key (related) |
//! |-----------------|------------------------|------------------------|
//! | `HasOne`/`HasMany` | host primary key    | `foreign_key(host)`    |
//! | `BelongsTo`     | `foreign_key(related)` | related primary key    |
//! | `BelongsToMany` | host primary key       | related primary key    |
//!
//! Many-to-many relations go through the pivot table
//! `pivot_table_name(host.table, related.table)` holding `foreign_key(host)`
//! and `foreign_key(related)`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::Value;

use super::metadata::{PivotMetadata, RelationDeclaration, RelationKind, RelationMetadata};
use crate::collection::{match_key, Collection, Row};
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelDefinition, PIVOT_PREFIX};
use crate::naming;
use crate::session::ModelQuery;

/// Resolve `declaration` against concrete definitions, overrides first
pub fn describe(
    host: &ModelDefinition,
    related: Arc<ModelDefinition>,
    declaration: &RelationDeclaration,
) -> RelationMetadata {
    let (default_target, default_relation) = match declaration.kind {
        RelationKind::HasOne | RelationKind::HasMany => (
            host.primary_key().to_string(),
            naming::foreign_key_name(host.name()),
        ),
        RelationKind::BelongsTo => (
            naming::foreign_key_name(related.name()),
            related.primary_key().to_string(),
        ),
        RelationKind::BelongsToMany => (
            host.primary_key().to_string(),
            related.primary_key().to_string(),
        ),
    };

    let pivot = declaration.kind.requires_pivot().then(|| PivotMetadata {
        table: declaration
            .pivot_table
            .clone()
            .unwrap_or_else(|| naming::pivot_table_name(host.table(), related.table())),
        target_key: declaration
            .pivot_target_key
            .clone()
            .unwrap_or_else(|| naming::foreign_key_name(host.name())),
        relation_key: declaration
            .pivot_relation_key
            .clone()
            .unwrap_or_else(|| naming::foreign_key_name(related.name())),
    });

    RelationMetadata {
        kind: declaration.kind,
        target_key: declaration.target_key.clone().unwrap_or(default_target),
        relation_key: declaration.relation_key.clone().unwrap_or(default_relation),
        pivot,
        pivot_columns: declaration.pivot_columns.clone(),
        nested_scope: Vec::new(),
        related,
    }
}

/// Look up the related definition through the registry and describe the relation
pub fn resolve(
    db: &Database,
    host: &ModelDefinition,
    declaration: &RelationDeclaration,
) -> ModelResult<RelationMetadata> {
    let related = db.definition(&declaration.binding)?;
    Ok(describe(host, related, declaration))
}

/// Resolve a relation registered on `host` under `name`
pub fn resolve_named(
    db: &Database,
    host: &ModelDefinition,
    name: &str,
    nested_scope: &[String],
) -> ModelResult<RelationMetadata> {
    let declaration = host.relation(name).ok_or_else(|| {
        ModelError::Relationship(format!(
            "relation '{}' is not defined on model '{}'",
            name,
            host.name()
        ))
    })?;
    let mut metadata = resolve(db, host, declaration)?;
    metadata.nested_scope = nested_scope.to_vec();
    Ok(metadata)
}

/// Constrain a query of the related model to the rows belonging to one host row
pub fn constrain_to_row(
    mut query: ModelQuery,
    metadata: &RelationMetadata,
    attributes: &Row,
) -> ModelResult<ModelQuery> {
    let key = attributes
        .get(&metadata.target_key)
        .filter(|value| !value.is_null())
        .cloned()
        .ok_or_else(|| {
            ModelError::Relationship(format!(
                "cannot resolve {} relation to '{}': attribute '{}' is not set",
                metadata.kind,
                metadata.related.name(),
                metadata.target_key
            ))
        })?;

    match &metadata.pivot {
        Some(pivot) => {
            let related_key = metadata.qualified_relation_key();
            let pivot_relation = format!("{}.{}", pivot.table, pivot.relation_key);
            let pivot_target = format!("{}.{}", pivot.table, pivot.target_key);
            query.constrain(|session| {
                session
                    .join(&pivot.table, &pivot_relation, &related_key)
                    .where_eq(&pivot_target, key)
            });
            query.traverse_pivot(pivot.clone(), &metadata.pivot_columns);
        }
        None => {
            let related_key = metadata.qualified_relation_key();
            query.constrain(|session| session.where_eq(&related_key, key));
        }
    }

    if metadata.kind.is_single() {
        query.constrain(|session| session.limit(1));
    }

    query.extend_eager(metadata.nested_scope.as_slice());
    Ok(query)
}

/// One relation to eager-load for a batch of host rows
#[derive(Debug)]
pub(crate) struct EagerPlan {
    name: String,
    metadata: RelationMetadata,
    /// Distinct host key values, in first-seen order
    keys: Vec<Value>,
    /// Canonical host key of each row, read before visibility strips anything
    row_keys: Vec<Option<String>>,
}

/// Resolve every relation in `relations` and read the host keys from `rows`.
///
/// Runs on the rows as fetched, so a hidden target key still pairs rows.
pub(crate) fn plan_eager(
    db: &Database,
    host: &ModelDefinition,
    rows: &[Row],
    relations: &[String],
    nested_scopes: &HashMap<String, Vec<String>>,
) -> ModelResult<Vec<EagerPlan>> {
    relations
        .iter()
        .map(|name| {
            let nested = nested_scopes.get(name).map(Vec::as_slice).unwrap_or_default();
            let metadata = resolve_named(db, host, name, nested)?;
            let row_keys = rows
                .iter()
                .map(|row| row.get(&metadata.target_key).and_then(match_key))
                .collect();
            let keys = distinct_keys(rows, &metadata.target_key);
            Ok(EagerPlan {
                name: name.clone(),
                metadata,
                keys,
                row_keys,
            })
        })
        .collect()
}

/// Load every planned relation and attach the results to `rows`.
///
/// Runs one query per relation, all concurrently, and attaches only once
/// every query has succeeded; the first failure aborts the whole load.
pub(crate) fn load_eager<'a>(
    db: &'a Database,
    plans: Vec<EagerPlan>,
    rows: &'a mut [Row],
) -> BoxFuture<'a, ModelResult<()>> {
    async move {
        let loaded = try_join_all(plans.into_iter().map(|mut plan| async move {
            let keys = std::mem::take(&mut plan.keys);
            let related = load_related(db, &plan.metadata, keys).await?;
            Ok::<_, ModelError>((plan, related))
        }))
        .await?;

        for (plan, (related, related_keys)) in loaded {
            attach(rows, &plan, related, related_keys);
        }
        Ok(())
    }
    .boxed()
}

/// Distinct non-null values of `column`, in first-seen order
fn distinct_keys(rows: &[Row], column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| match_key(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

/// Column on related rows that carries the host key
fn match_column(metadata: &RelationMetadata) -> String {
    match &metadata.pivot {
        Some(pivot) => format!("{}{}", PIVOT_PREFIX, pivot.target_key),
        None => metadata.relation_key.clone(),
    }
}

/// Related rows plus the canonical match key of each, read before visibility
async fn load_related(
    db: &Database,
    metadata: &RelationMetadata,
    keys: Vec<Value>,
) -> ModelResult<(Collection, Vec<Option<String>>)> {
    if keys.is_empty() {
        return Ok((Collection::default(), Vec::new()));
    }

    let mut query = db.query_for(Arc::clone(&metadata.related));
    match &metadata.pivot {
        Some(pivot) => {
            let related_key = metadata.qualified_relation_key();
            let pivot_relation = format!("{}.{}", pivot.table, pivot.relation_key);
            let pivot_target = format!("{}.{}", pivot.table, pivot.target_key);
            query.constrain(|session| {
                session
                    .join(&pivot.table, &pivot_relation, &related_key)
                    .where_in(&pivot_target, keys)
            });

            let mut columns = metadata.pivot_columns.clone();
            if !columns.contains(&pivot.target_key) {
                columns.push(pivot.target_key.clone());
            }
            query.traverse_pivot(pivot.clone(), &columns);
        }
        None => {
            let related_key = metadata.qualified_relation_key();
            query.constrain(|session| session.where_in(&related_key, keys));
        }
    }
    query.extend_eager(metadata.nested_scope.as_slice());

    query.all_keyed(&match_column(metadata)).await
}

fn attach(rows: &mut [Row], plan: &EagerPlan, related: Collection, related_keys: Vec<Option<String>>) {
    let metadata = &plan.metadata;
    // the pivot match column is only projected for grouping unless requested
    let internal = metadata
        .pivot
        .as_ref()
        .filter(|pivot| !metadata.pivot_columns.contains(&pivot.target_key))
        .map(|_| match_column(metadata));

    let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
    for (mut row, key) in related.into_iter().zip(related_keys) {
        if let Some(column) = &internal {
            row.remove(column);
        }
        if let Some(key) = key {
            grouped.entry(key).or_default().push(row);
        }
    }

    for (row, key) in rows.iter_mut().zip(&plan.row_keys) {
        let matched = key
            .as_ref()
            .and_then(|key| grouped.get(key))
            .cloned()
            .unwrap_or_default();

        let value = if metadata.kind.is_single() {
            matched.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
        } else {
            Value::Array(matched.into_iter().map(Value::Object).collect())
        };
        row.insert(plan.name.clone(), value);
    }
}
