//! Relationships Module - Relation declarations, resolution and eager loading

pub mod metadata;
pub mod resolver;

pub use metadata::{PivotMetadata, RelationDeclaration, RelationKind, RelationMetadata};
