//! Model Registry - Lookup of model definitions by binding
//!
//! Relations name their related model by binding; the registry turns that
//! binding into the shared definition.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::ModelDefinition;

/// Registered model definitions keyed by name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDefinition>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its name, replacing any earlier one
    pub fn register(&mut self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        let definition = Arc::new(definition);
        self.models
            .insert(definition.name().to_string(), Arc::clone(&definition));
        definition
    }

    /// Builder form of [`ModelRegistry::register`]
    pub fn with(mut self, definition: ModelDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, binding: &str) -> ModelResult<Arc<ModelDefinition>> {
        self.models
            .get(binding)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(binding.to_string()))
    }

    pub fn contains(&self, binding: &str) -> bool {
        self.models.contains_key(binding)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Check that every declared relation points at a registered model
    pub fn validate(&self) -> ModelResult<()> {
        let mut names: Vec<&String> = self.models.keys().collect();
        names.sort();

        for name in names {
            let definition = &self.models[name];
            for (relation, declaration) in definition.relations() {
                if !self.contains(&declaration.binding) {
                    return Err(ModelError::Configuration(format!(
                        "relation '{}' on model '{}' refers to unregistered model '{}'",
                        relation, name, declaration.binding
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationDeclaration;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ModelRegistry::new();
        let user = registry.register(ModelDefinition::new("User"));
        assert_eq!(user.table(), "users");
        assert_eq!(registry.get("User").unwrap().table(), "users");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_binding() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.get("Ghost").unwrap_err(),
            ModelError::UnknownModel("Ghost".to_string())
        );
    }

    #[test]
    fn test_validate_reports_dangling_relations() {
        let registry = ModelRegistry::new().with(
            ModelDefinition::new("User").with_relation("profile", RelationDeclaration::has_one("Profile")),
        );
        assert!(matches!(registry.validate(), Err(ModelError::Configuration(_))));

        let registry = registry.with(ModelDefinition::new("Profile"));
        assert!(registry.validate().is_ok());
    }
}
