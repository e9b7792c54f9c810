//! Relationship Metadata System - Declared relations and their resolved form

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::ModelDefinition;

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// One-to-one, foreign key on the related table
    HasOne,
    /// One-to-many, foreign key on the related table
    HasMany,
    /// Many-to-one, foreign key on the host table
    BelongsTo,
    /// Many-to-many through a pivot table
    BelongsToMany,
}

impl RelationKind {
    /// Returns true if this relationship yields at most one row
    pub fn is_single(self) -> bool {
        matches!(self, Self::HasOne | Self::BelongsTo)
    }

    /// Returns true if this relationship requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::BelongsToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
        };
        f.write_str(name)
    }
}

/// A relation registered by name on a model definition.
///
/// Keys left as `None` are inferred from naming conventions when the
/// relation is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDeclaration {
    pub kind: RelationKind,
    /// Registry binding of the related model
    pub binding: String,
    pub target_key: Option<String>,
    pub relation_key: Option<String>,
    pub pivot_table: Option<String>,
    pub pivot_target_key: Option<String>,
    pub pivot_relation_key: Option<String>,
    /// Pivot columns to project alongside related rows
    pub pivot_columns: Vec<String>,
}

impl RelationDeclaration {
    fn new(kind: RelationKind, binding: &str) -> Self {
        Self {
            kind,
            binding: binding.to_string(),
            target_key: None,
            relation_key: None,
            pivot_table: None,
            pivot_target_key: None,
            pivot_relation_key: None,
            pivot_columns: Vec::new(),
        }
    }

    pub fn has_one(binding: &str) -> Self {
        Self::new(RelationKind::HasOne, binding)
    }

    pub fn has_many(binding: &str) -> Self {
        Self::new(RelationKind::HasMany, binding)
    }

    pub fn belongs_to(binding: &str) -> Self {
        Self::new(RelationKind::BelongsTo, binding)
    }

    pub fn belongs_to_many(binding: &str) -> Self {
        Self::new(RelationKind::BelongsToMany, binding)
    }

    /// Override the key read from the host row
    pub fn target_key(mut self, key: &str) -> Self {
        self.target_key = Some(key.to_string());
        self
    }

    /// Override the key matched on the related row
    pub fn relation_key(mut self, key: &str) -> Self {
        self.relation_key = Some(key.to_string());
        self
    }

    pub fn pivot_table(mut self, table: &str) -> Self {
        self.pivot_table = Some(table.to_string());
        self
    }

    /// Override the pivot columns pointing at the host and at the related model
    pub fn pivot_keys(mut self, target_key: &str, relation_key: &str) -> Self {
        self.pivot_target_key = Some(target_key.to_string());
        self.pivot_relation_key = Some(relation_key.to_string());
        self
    }

    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        self.pivot_columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }
}

/// Pivot table configuration of a resolved many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotMetadata {
    pub table: String,
    /// Pivot column holding the host key
    pub target_key: String,
    /// Pivot column holding the related key
    pub relation_key: String,
}

/// A relation resolved against concrete host and related definitions.
///
/// Built fresh for every declaration call and never mutated afterwards.
/// Related rows always satisfy `related.relation_key == host.target_key`
/// (through the pivot table for `BelongsToMany`).
#[derive(Debug, Clone)]
pub struct RelationMetadata {
    pub kind: RelationKind,
    pub related: Arc<ModelDefinition>,
    pub target_key: String,
    pub relation_key: String,
    pub pivot: Option<PivotMetadata>,
    pub pivot_columns: Vec<String>,
    /// Relations the related model eager-loads in turn
    pub nested_scope: Vec<String>,
}

impl RelationMetadata {
    /// Related column matched against the host key, qualified by table
    pub fn qualified_relation_key(&self) -> String {
        format!("{}.{}", self.related.table(), self.relation_key)
    }
}
