//! Model Definition - Static per-model configuration
//!
//! Table, primary key, soft-delete column, timestamps, attribute visibility,
//! getters/setters and named relations. A definition is read-only once
//! registered and shared behind an `Arc` by every query and instance.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::collection::Row;
use crate::config::OrmConfig;
use crate::naming;
use crate::relationships::RelationDeclaration;

/// Transformation applied to a single attribute value
pub type AttributeMutator = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Prefix of pivot columns projected into related rows
pub const PIVOT_PREFIX: &str = "_pivot_";

/// Static configuration of one model
#[derive(Clone)]
pub struct ModelDefinition {
    name: String,
    table: String,
    primary_key: String,
    soft_delete_column: Option<String>,
    timestamps: bool,
    created_at_column: String,
    updated_at_column: String,
    hidden: Vec<String>,
    visible: Vec<String>,
    fields: Vec<String>,
    getters: HashMap<String, AttributeMutator>,
    setters: HashMap<String, AttributeMutator>,
    relations: BTreeMap<String, RelationDeclaration>,
}

impl ModelDefinition {
    /// Definition for model `name` with conventional defaults
    pub fn new(name: &str) -> Self {
        Self::configured(name, &OrmConfig::default())
    }

    /// Definition for model `name` using the column conventions of `config`
    pub fn configured(name: &str, config: &OrmConfig) -> Self {
        Self {
            name: name.to_string(),
            table: naming::table_name(name),
            primary_key: config.primary_key.clone(),
            soft_delete_column: Some(config.soft_delete_column.clone()),
            timestamps: true,
            created_at_column: config.created_at_column.clone(),
            updated_at_column: config.updated_at_column.clone(),
            hidden: Vec::new(),
            visible: Vec::new(),
            fields: Vec::new(),
            getters: HashMap::new(),
            setters: HashMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    pub fn with_soft_deletes(mut self, column: &str) -> Self {
        self.soft_delete_column = Some(column.to_string());
        self
    }

    pub fn without_soft_deletes(mut self) -> Self {
        self.soft_delete_column = None;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Attributes removed from fetched rows
    pub fn with_hidden(mut self, fields: &[&str]) -> Self {
        self.hidden = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Whitelist of attributes kept on fetched rows; takes precedence over `hidden`
    pub fn with_visible(mut self, fields: &[&str]) -> Self {
        self.visible = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Known attribute names; when set, `Model::new` and `Model::set` reject anything else
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Register a getter applied to `field` on every fetched row
    pub fn with_getter<F>(mut self, field: &str, getter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(naming::getter_name(field), Arc::new(getter));
        self
    }

    /// Register a setter applied to `field` whenever it is assigned
    pub fn with_setter<F>(mut self, field: &str, setter: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.setters.insert(naming::setter_name(field), Arc::new(setter));
        self
    }

    /// Declare a named relation
    pub fn with_relation(mut self, name: &str, declaration: RelationDeclaration) -> Self {
        self.relations.insert(name.to_string(), declaration);
        self
    }

    /// Model identifier, also its registry binding
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Primary key qualified by the table name
    pub fn qualified_primary_key(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }

    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete_column.as_deref()
    }

    pub fn uses_soft_deletes(&self) -> bool {
        self.soft_delete_column.is_some()
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn created_at_column(&self) -> &str {
        &self.created_at_column
    }

    pub fn updated_at_column(&self) -> &str {
        &self.updated_at_column
    }

    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether `field` may be assigned on an instance
    pub fn accepts_field(&self, field: &str) -> bool {
        self.fields.is_empty() || field == self.primary_key || self.fields.iter().any(|f| f == field)
    }

    pub fn getter(&self, field: &str) -> Option<&AttributeMutator> {
        self.getters.get(&naming::getter_name(field))
    }

    pub fn setter(&self, field: &str) -> Option<&AttributeMutator> {
        self.setters.get(&naming::setter_name(field))
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDeclaration> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDeclaration)> {
        self.relations.iter().map(|(name, decl)| (name.as_str(), decl))
    }

    /// Apply the `visible` whitelist, or else drop `hidden` attributes.
    /// Projected pivot columns are always kept.
    pub fn apply_visibility(&self, row: &mut Row) {
        if !self.visible.is_empty() {
            row.retain(|key, _| key.starts_with(PIVOT_PREFIX) || self.visible.iter().any(|v| v == key));
        } else if !self.hidden.is_empty() {
            for field in &self.hidden {
                row.remove(field);
            }
        }
    }

    /// Run registered getters over every attribute of `row`
    pub fn apply_getters(&self, row: &mut Row) {
        if self.getters.is_empty() {
            return;
        }
        for (field, value) in row.iter_mut() {
            if let Some(getter) = self.getter(field) {
                *value = getter(value);
            }
        }
    }

    /// Run registered setters over every attribute of `row`
    pub fn apply_setters(&self, row: &mut Row) {
        if self.setters.is_empty() {
            return;
        }
        for (field, value) in row.iter_mut() {
            if let Some(setter) = self.setter(field) {
                *value = setter(value);
            }
        }
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("soft_delete_column", &self.soft_delete_column)
            .field("timestamps", &self.timestamps)
            .field("hidden", &self.hidden)
            .field("visible", &self.visible)
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}
