//! Active Query Session - A model's single-use query handle
//!
//! [`ModelQuery`] collects predicates, eager-load requests and the pivot
//! being traversed. Terminal operations live in [`dispatch`]; every one of
//! them resets the handle to an unconditioned query on the model's table.

pub mod dispatch;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::database::Database;
use crate::error::ModelResult;
use crate::model::ModelDefinition;
use crate::query::QueryBuilder;
use crate::relationships::{resolver, PivotMetadata, RelationDeclaration, RelationMetadata};

/// Query session bound to one model definition
#[derive(Debug, Clone)]
pub struct ModelQuery {
    pub(crate) db: Database,
    pub(crate) definition: Arc<ModelDefinition>,
    pub(crate) session: QueryBuilder,
    pub(crate) with_trashed: bool,
    pub(crate) eager: Vec<String>,
    pub(crate) nested_scopes: HashMap<String, Vec<String>>,
    pub(crate) pivot: Option<PivotMetadata>,
    pub(crate) pivot_columns: Vec<String>,
    pub(crate) active_relation: Option<RelationMetadata>,
}

impl ModelQuery {
    pub fn new(db: Database, definition: Arc<ModelDefinition>) -> Self {
        let session = QueryBuilder::table(definition.table());
        Self {
            db,
            definition,
            session,
            with_trashed: false,
            eager: Vec::new(),
            nested_scopes: HashMap::new(),
            pivot: None,
            pivot_columns: Vec::new(),
            active_relation: None,
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    /// The builder as chained so far, before any terminal policy is applied
    pub fn session(&self) -> &QueryBuilder {
        &self.session
    }

    /// Relation most recently declared on this session without executing it
    pub fn active_relation(&self) -> Option<&RelationMetadata> {
        self.active_relation.as_ref()
    }

    /// Relations queued for eager loading, in declaration order
    pub fn eager_relations(&self) -> &[String] {
        &self.eager
    }

    /// Nested eager-load scope recorded for `relation`
    pub fn nested_scope(&self, relation: &str) -> &[String] {
        self.nested_scopes.get(relation).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_with_trashed(&self) -> bool {
        self.with_trashed
    }

    pub(crate) fn constrain(&mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) {
        let session = std::mem::take(&mut self.session);
        self.session = f(session);
    }

    /// Mark a pivot table as traversed and project `columns` from it
    pub(crate) fn traverse_pivot(&mut self, pivot: PivotMetadata, columns: &[String]) {
        self.pivot = Some(pivot);
        for column in columns {
            if !self.pivot_columns.contains(column) {
                self.pivot_columns.push(column.clone());
            }
        }
    }

    /// Queue dotted relation paths for eager loading.
    ///
    /// `posts.comments` queues `posts` and records `comments` as the nested
    /// scope `posts` is loaded with.
    pub(crate) fn extend_eager<S: AsRef<str>>(&mut self, paths: &[S]) {
        for path in paths {
            let path: &str = path.as_ref();
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            if !self.eager.iter().any(|name| name == head) {
                self.eager.push(head.to_string());
            }
            if let Some(rest) = rest {
                let scope = self.nested_scopes.entry(head.to_string()).or_default();
                if !scope.iter().any(|nested| nested == rest) {
                    scope.push(rest.to_string());
                }
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.session = QueryBuilder::table(self.definition.table());
        self.with_trashed = false;
        self.eager.clear();
        self.nested_scopes.clear();
        self.pivot = None;
        self.pivot_columns.clear();
        self.active_relation = None;
    }

    pub fn where_eq<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_eq(column, value));
        self
    }

    pub fn where_ne<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_ne(column, value));
        self
    }

    pub fn where_gt<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_gt(column, value));
        self
    }

    pub fn where_gte<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_gte(column, value));
        self
    }

    pub fn where_lt<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_lt(column, value));
        self
    }

    pub fn where_lte<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_lte(column, value));
        self
    }

    pub fn where_like(mut self, column: &str, pattern: &str) -> Self {
        self.constrain(|q| q.where_like(column, pattern));
        self
    }

    pub fn where_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.constrain(|q| q.where_in(column, values));
        self
    }

    pub fn where_not_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.constrain(|q| q.where_not_in(column, values));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.constrain(|q| q.where_null(column));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.constrain(|q| q.where_not_null(column));
        self
    }

    pub fn select(mut self, fields: &str) -> Self {
        self.constrain(|q| q.select(fields));
        self
    }

    pub fn join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.constrain(|q| q.join(table, left_col, right_col));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.constrain(|q| q.order_by(column));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.constrain(|q| q.order_by_desc(column));
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.constrain(|q| q.limit(count));
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.constrain(|q| q.offset(count));
        self
    }

    /// Eager-load relations by name; dotted paths load nested relations
    pub fn with(mut self, relations: &[&str]) -> Self {
        self.extend_eager(relations);
        self
    }

    /// Project extra pivot columns (as `_pivot_<column>`) when a pivot is traversed
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if !self.pivot_columns.iter().any(|c| c == column) {
                self.pivot_columns.push(column.to_string());
            }
        }
        self
    }

    /// Include soft-deleted rows in the next terminal call only
    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    /// SQL the next terminal call would run, literals inlined
    pub fn to_sql(&self) -> String {
        self.prepared().to_sql()
    }

    /// Declare a one-to-one relation without executing anything.
    ///
    /// The relation is recorded as this session's active relation and a
    /// fresh query of the related model is returned.
    pub fn has_one(
        &mut self,
        binding: &str,
        target_key: Option<&str>,
        relation_key: Option<&str>,
    ) -> ModelResult<ModelQuery> {
        self.declare_with(keyed(RelationDeclaration::has_one(binding), target_key, relation_key))
    }

    pub fn has_many(
        &mut self,
        binding: &str,
        target_key: Option<&str>,
        relation_key: Option<&str>,
    ) -> ModelResult<ModelQuery> {
        self.declare_with(keyed(RelationDeclaration::has_many(binding), target_key, relation_key))
    }

    pub fn belongs_to(
        &mut self,
        binding: &str,
        target_key: Option<&str>,
        relation_key: Option<&str>,
    ) -> ModelResult<ModelQuery> {
        self.declare_with(keyed(RelationDeclaration::belongs_to(binding), target_key, relation_key))
    }

    pub fn belongs_to_many(
        &mut self,
        binding: &str,
        pivot_table: Option<&str>,
        pivot_target_key: Option<&str>,
        pivot_relation_key: Option<&str>,
    ) -> ModelResult<ModelQuery> {
        let declaration = pivoted(
            RelationDeclaration::belongs_to_many(binding),
            pivot_table,
            pivot_target_key,
            pivot_relation_key,
        );
        self.declare_with(declaration)
    }

    /// Declare the relation registered under `name` on this model
    pub fn declare(&mut self, name: &str) -> ModelResult<ModelQuery> {
        let nested = self.nested_scope(name).to_vec();
        let metadata = resolver::resolve_named(&self.db, &self.definition, name, &nested)?;
        Ok(self.activate(metadata))
    }

    fn declare_with(&mut self, declaration: RelationDeclaration) -> ModelResult<ModelQuery> {
        let mut metadata = resolver::resolve(&self.db, &self.definition, &declaration)?;
        metadata.nested_scope = self.declared_scope(&declaration);
        Ok(self.activate(metadata))
    }

    /// Nested scope queued for the host relation with the same kind and binding
    fn declared_scope(&self, declaration: &RelationDeclaration) -> Vec<String> {
        self.definition
            .relations()
            .filter(|(_, declared)| declared.kind == declaration.kind && declared.binding == declaration.binding)
            .find_map(|(name, _)| self.nested_scopes.get(name))
            .cloned()
            .unwrap_or_default()
    }

    fn activate(&mut self, metadata: RelationMetadata) -> ModelQuery {
        tracing::debug!(
            "Declared {} relation {} -> {}",
            metadata.kind,
            self.definition.name(),
            metadata.related.name()
        );
        let mut related = self.db.query_for(Arc::clone(&metadata.related));
        related.extend_eager(metadata.nested_scope.as_slice());
        self.active_relation = Some(metadata);
        related
    }
}

/// Apply optional key overrides to a declaration
pub(crate) fn keyed(
    mut declaration: RelationDeclaration,
    target_key: Option<&str>,
    relation_key: Option<&str>,
) -> RelationDeclaration {
    if let Some(key) = target_key {
        declaration = declaration.target_key(key);
    }
    if let Some(key) = relation_key {
        declaration = declaration.relation_key(key);
    }
    declaration
}

/// Apply optional pivot overrides to a many-to-many declaration
pub(crate) fn pivoted(
    mut declaration: RelationDeclaration,
    pivot_table: Option<&str>,
    pivot_target_key: Option<&str>,
    pivot_relation_key: Option<&str>,
) -> RelationDeclaration {
    if let Some(table) = pivot_table {
        declaration = declaration.pivot_table(table);
    }
    declaration.pivot_target_key = pivot_target_key.map(str::to_string);
    declaration.pivot_relation_key = pivot_relation_key.map(str::to_string);
    declaration
}
