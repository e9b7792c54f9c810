//! Database Integration - Handle tying storage, models and configuration together
//!
//! A [`Database`] is cheap to clone and is what every query session and
//! model instance carries: the executor that runs queries, the registry used
//! to resolve relation bindings, and the active configuration.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::backends::{PostgresExecutor, QueryExecutor};
use crate::config::OrmConfig;
use crate::error::OrmResult;
use crate::model::{Model, ModelDefinition, ModelRegistry};
use crate::session::ModelQuery;

/// Shared handle to storage and registered models
#[derive(Clone)]
pub struct Database {
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<ModelRegistry>,
    config: Arc<OrmConfig>,
}

impl Database {
    /// Create a handle over `executor`, validating the registry's relations
    pub fn new(executor: Arc<dyn QueryExecutor>, registry: ModelRegistry) -> OrmResult<Self> {
        Self::with_config(executor, registry, OrmConfig::default())
    }

    pub fn with_config(
        executor: Arc<dyn QueryExecutor>,
        registry: ModelRegistry,
        config: OrmConfig,
    ) -> OrmResult<Self> {
        config.validate()?;
        registry.validate()?;

        tracing::debug!(
            "Database handle created (backend: {}, models: {})",
            executor.backend_type(),
            registry.len()
        );

        Ok(Self {
            executor,
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    /// Connect to PostgreSQL using `config.database_url`
    pub async fn connect(config: OrmConfig, registry: ModelRegistry) -> OrmResult<Self> {
        config.validate()?;
        let executor = PostgresExecutor::connect(&config).await?;
        Self::with_config(Arc::new(executor), registry, config)
    }

    /// Fresh query session for the model registered as `binding`
    pub fn query(&self, binding: &str) -> OrmResult<ModelQuery> {
        Ok(self.query_for(self.registry.get(binding)?))
    }

    pub fn query_for(&self, definition: Arc<ModelDefinition>) -> ModelQuery {
        ModelQuery::new(self.clone(), definition)
    }

    /// Unsaved instance of `binding` built from `attributes`
    pub fn model(&self, binding: &str, attributes: Value) -> OrmResult<Model> {
        Model::new(self.clone(), self.registry.get(binding)?, attributes)
    }

    pub fn definition(&self, binding: &str) -> OrmResult<Arc<ModelDefinition>> {
        self.registry.get(binding)
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.executor.backend_type())
            .field("models", &self.registry.len())
            .field("environment", &self.config.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::error::ModelError;
    use crate::relationships::RelationDeclaration;

    #[test]
    fn test_new_validates_registry() {
        let registry = ModelRegistry::new()
            .with(ModelDefinition::new("User").with_relation("posts", RelationDeclaration::has_many("Post")));
        let err = Database::new(Arc::new(MemoryBackend::new()), registry).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_unknown_binding_lookup() {
        let db = Database::new(Arc::new(MemoryBackend::new()), ModelRegistry::new()).unwrap();
        assert!(matches!(db.query("User"), Err(ModelError::UnknownModel(_))));
        assert!(matches!(db.model("User", Value::Null), Err(ModelError::UnknownModel(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = OrmConfig {
            max_connections: 0,
            ..OrmConfig::default()
        };
        let err = Database::with_config(Arc::new(MemoryBackend::new()), ModelRegistry::new(), config).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }
}
