//! Model Instance - Attributes, persistence and instance-bound relations

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::collection::Row;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelDefinition, PIVOT_PREFIX};
use crate::query::QueryBuilder;
use crate::relationships::{resolver, RelationDeclaration};
use crate::session::{keyed, pivoted, ModelQuery};

/// A single record of a model
#[derive(Debug, Clone)]
pub struct Model {
    db: Database,
    definition: Arc<ModelDefinition>,
    attributes: Row,
    session: QueryBuilder,
    hydrated: bool,
}

impl Model {
    /// Build an unsaved instance from a JSON object, running setters on every attribute.
    ///
    /// `null` gives an empty instance. Arrays (bulk input), scalars and keys
    /// outside the declared fields are rejected.
    pub fn new(db: Database, definition: Arc<ModelDefinition>, attributes: Value) -> ModelResult<Self> {
        let mut attributes = match attributes {
            Value::Null => Row::new(),
            Value::Object(map) => map,
            Value::Array(_) => {
                return Err(ModelError::InvalidArgument(format!(
                    "cannot build a single {} from an array; create instances one at a time",
                    definition.name()
                )))
            }
            other => {
                return Err(ModelError::InvalidArgument(format!(
                    "{} attributes must be an object, got {}",
                    definition.name(),
                    other
                )))
            }
        };
        if let Some(unknown) = attributes.keys().find(|key| !definition.accepts_field(key)) {
            return Err(ModelError::InvalidArgument(format!(
                "'{}' is not a field of {}",
                unknown,
                definition.name()
            )));
        }
        definition.apply_setters(&mut attributes);

        let session = QueryBuilder::table(definition.table());
        Ok(Self {
            db,
            definition,
            attributes,
            session,
            hydrated: false,
        })
    }

    /// Instance for a fetched row; getters already ran, setters are not re-applied
    pub(crate) fn hydrate(db: Database, definition: Arc<ModelDefinition>, attributes: Row, key: Value) -> Self {
        let session = QueryBuilder::table(definition.table()).where_eq(definition.primary_key(), key);
        Self {
            db,
            definition,
            attributes,
            session,
            hydrated: true,
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Deserialize one attribute; a missing attribute gives `Ok(None)`
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> ModelResult<Option<T>> {
        self.attributes
            .get(field)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(ModelError::from)
    }

    /// Assign an attribute through its setter, if one is registered
    pub fn set<T: Into<Value>>(&mut self, field: &str, value: T) -> ModelResult<()> {
        if !self.definition.accepts_field(field) {
            return Err(ModelError::InvalidArgument(format!(
                "'{}' is not a field of {}",
                field,
                self.definition.name()
            )));
        }
        let value = value.into();
        let value = match self.definition.setter(field) {
            Some(setter) => setter(&value),
            None => value,
        };
        self.attributes.insert(field.to_string(), value);
        Ok(())
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    pub fn primary_key_value(&self) -> Option<&Value> {
        self.attributes
            .get(self.definition.primary_key())
            .filter(|value| !value.is_null())
    }

    /// True once the instance was loaded from or saved to storage
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// True when the soft-delete column is present and non-null
    pub fn is_trashed(&self) -> bool {
        self.definition
            .soft_delete_column()
            .and_then(|column| self.attributes.get(column))
            .is_some_and(|value| !value.is_null())
    }

    /// Insert the attributes as a new row.
    ///
    /// Stamps `created_at`/`updated_at` when timestamps are enabled. When
    /// storage returns the new primary key the instance becomes hydrated.
    pub async fn create(&mut self) -> ModelResult<()> {
        let table = self.definition.table().to_string();
        let primary_key = self.definition.primary_key().to_string();

        let mut values = self.attributes.clone();
        if values.get(&primary_key).is_some_and(Value::is_null) {
            values.remove(&primary_key);
        }
        if self.definition.uses_timestamps() {
            let now = Value::from(Utc::now().to_rfc3339());
            values
                .entry(self.definition.created_at_column().to_string())
                .or_insert_with(|| now.clone());
            values.insert(self.definition.updated_at_column().to_string(), now);
        }

        let query = QueryBuilder::new().insert_into(&table).set_values(values.clone());
        tracing::debug!("Creating {} row: {}", self.definition.name(), query.to_sql());

        let key = self
            .db
            .executor()
            .insert(&query, &primary_key)
            .await
            .inspect_err(|e| tracing::warn!("Insert into {} failed: {}", table, e))?;

        self.attributes = values;
        if let Some(key) = key {
            self.attributes.insert(primary_key.clone(), key.clone());
            self.session = QueryBuilder::table(&table).where_eq(&primary_key, key);
            self.hydrated = true;
        }
        Ok(())
    }

    /// Persist `values` (or every current attribute when `None`).
    ///
    /// Setters run on the provided values, `updated_at` is stamped and the
    /// primary key is never part of the SET list. Attributes change only
    /// after storage accepted the update.
    pub async fn update(&mut self, values: Option<Value>) -> ModelResult<u64> {
        self.ensure_hydrated("update")?;

        let mut changes = match values {
            None => self.persistable_attributes(),
            Some(Value::Object(mut map)) => {
                self.definition.apply_setters(&mut map);
                map
            }
            Some(other) => {
                return Err(ModelError::InvalidArgument(format!(
                    "update values must be an object, got {}",
                    other
                )))
            }
        };
        changes.remove(self.definition.primary_key());
        if self.definition.uses_timestamps() {
            changes.insert(
                self.definition.updated_at_column().to_string(),
                Value::from(Utc::now().to_rfc3339()),
            );
        }
        if changes.is_empty() {
            return Ok(0);
        }

        let query = self
            .session
            .clone()
            .update(self.definition.table())
            .set_values(changes.clone());
        let affected = self.execute(&query).await?;

        self.attributes.extend(changes);
        Ok(affected)
    }

    /// Soft-delete when the model uses soft deletes, otherwise delete the row
    pub async fn delete(&mut self) -> ModelResult<u64> {
        self.ensure_hydrated("delete")?;

        let Some(column) = self.definition.soft_delete_column().map(str::to_string) else {
            return self.hard_delete().await;
        };

        let stamp = Value::from(Utc::now().to_rfc3339());
        let query = self
            .session
            .clone()
            .update(self.definition.table())
            .set(&column, stamp.clone());
        let affected = self.execute(&query).await?;

        self.attributes.insert(column, stamp);
        Ok(affected)
    }

    /// Delete the row regardless of soft deletes and clear the instance
    pub async fn force_delete(&mut self) -> ModelResult<u64> {
        self.ensure_hydrated("force delete")?;
        let affected = self.hard_delete().await?;

        self.attributes.clear();
        self.session = QueryBuilder::table(self.definition.table());
        self.hydrated = false;
        Ok(affected)
    }

    pub fn has_one(&self, binding: &str, target_key: Option<&str>, relation_key: Option<&str>) -> ModelResult<ModelQuery> {
        self.relate(&keyed(RelationDeclaration::has_one(binding), target_key, relation_key))
    }

    pub fn has_many(&self, binding: &str, target_key: Option<&str>, relation_key: Option<&str>) -> ModelResult<ModelQuery> {
        self.relate(&keyed(RelationDeclaration::has_many(binding), target_key, relation_key))
    }

    pub fn belongs_to(&self, binding: &str, target_key: Option<&str>, relation_key: Option<&str>) -> ModelResult<ModelQuery> {
        self.relate(&keyed(RelationDeclaration::belongs_to(binding), target_key, relation_key))
    }

    pub fn belongs_to_many(
        &self,
        binding: &str,
        pivot_table: Option<&str>,
        pivot_target_key: Option<&str>,
        pivot_relation_key: Option<&str>,
    ) -> ModelResult<ModelQuery> {
        self.relate(&pivoted(
            RelationDeclaration::belongs_to_many(binding),
            pivot_table,
            pivot_target_key,
            pivot_relation_key,
        ))
    }

    /// Query of the relation registered under `name`, constrained to this instance
    pub fn related(&self, name: &str) -> ModelResult<ModelQuery> {
        let declaration = self.definition.relation(name).ok_or_else(|| {
            ModelError::Relationship(format!(
                "relation '{}' is not defined on model '{}'",
                name,
                self.definition.name()
            ))
        })?;
        self.relate(declaration)
    }

    fn relate(&self, declaration: &RelationDeclaration) -> ModelResult<ModelQuery> {
        let metadata = resolver::resolve(&self.db, &self.definition, declaration)?;
        let query = self.db.query_for(Arc::clone(&metadata.related));
        resolver::constrain_to_row(query, &metadata, &self.attributes)
    }

    fn ensure_hydrated(&self, operation: &str) -> ModelResult<()> {
        if self.hydrated {
            Ok(())
        } else {
            Err(ModelError::InvalidState(format!(
                "cannot {} a {} that was never fetched or saved",
                operation,
                self.definition.name()
            )))
        }
    }

    /// Column attributes only: no projected pivot columns or attached relations
    fn persistable_attributes(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(key, _)| !key.starts_with(PIVOT_PREFIX) && self.definition.relation(key).is_none())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    async fn hard_delete(&self) -> ModelResult<u64> {
        let query = self.session.clone().delete_from(self.definition.table());
        self.execute(&query).await
    }

    async fn execute(&self, query: &QueryBuilder) -> ModelResult<u64> {
        tracing::debug!("Executing on {}: {}", self.definition.table(), query.to_sql());
        self.db
            .executor()
            .execute(query)
            .await
            .inspect_err(|e| tracing::warn!("Statement on {} failed: {}", self.definition.table(), e))
    }
}
