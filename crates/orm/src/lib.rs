//! # elif-active-record: Relation resolution and query dispatch for elif.rs
//!
//! Active-Record style models on top of a fluent query builder. A model
//! definition names its table, primary key, soft-delete column, visibility
//! rules, getters/setters and relations. Relations resolve into constrained
//! queries of the related model, and every terminal query runs through one
//! pipeline that applies soft deletes, projection, visibility, getters and
//! eager loading in a fixed order.

pub mod backends;
pub mod collection;
pub mod config;
pub mod database;
pub mod error;
pub mod migration;
pub mod model;
pub mod naming;
pub mod query;
pub mod relationships;
pub mod session;

#[cfg(test)]
mod tests;

pub use backends::{DatabaseBackendType, MemoryBackend, PostgresExecutor, QueryExecutor};
pub use collection::{Collection, Fetched, Paginated, Row};
pub use config::{Environment, OrmConfig};
pub use database::Database;
pub use error::*;
pub use migration::{run_latest, MigrationOutcome, MigrationRunner, MigrationSet, MigrationStatus};
pub use model::{Model, ModelDefinition, ModelRegistry};
pub use query::QueryBuilder;
pub use relationships::{PivotMetadata, RelationDeclaration, RelationKind, RelationMetadata};
pub use session::ModelQuery;
