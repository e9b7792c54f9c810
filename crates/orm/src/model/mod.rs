//! Model System - Definitions, registry and instances
//!
//! - `definition`: static per-model configuration
//! - `registry`: lookup of definitions by binding
//! - `instance`: a single record with persistence and relation helpers

pub mod definition;
pub mod instance;
pub mod registry;

pub use definition::{AttributeMutator, ModelDefinition, PIVOT_PREFIX};
pub use instance::Model;
pub use registry::ModelRegistry;
