//! Database Backend Abstractions
//!
//! [`QueryExecutor`] is the seam between the model layer and storage.
//! PostgreSQL runs through sqlx; the in-memory backend evaluates queries
//! in process.

pub mod core;
pub mod memory;
pub mod postgres;

pub use core::{DatabaseBackendType, QueryExecutor};
pub use memory::MemoryBackend;
pub use postgres::PostgresExecutor;
