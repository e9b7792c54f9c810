//! Error types for the ORM system
//!
//! Precondition failures (`InvalidArgument`, `InvalidState`) are raised before
//! any I/O. Failures coming back from the storage collaborator surface as
//! `Database` or `Connection` and are propagated unchanged.

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// An argument had the wrong shape, e.g. a bulk array passed to a model constructor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the instance's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Failure reported by the storage collaborator
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Relationship resolution failed
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// No model registered under the given binding
    #[error("Unknown model binding '{0}'")]
    UnknownModel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Query building error
    #[error("Query error: {0}")]
    Query(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),
}

impl ModelError {
    /// True for failures that originate in the storage layer
    pub fn is_upstream(&self) -> bool {
        matches!(self, ModelError::Database(_) | ModelError::Connection(_))
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
