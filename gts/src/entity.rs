//! The entity model: a parsed document paired with its derived GTS id.
//!
//! Reimplemented as a tagged sum type rather than a duck-typed struct with an
//! `is_schema` flag — schema and instance entities carry only the fields that
//! apply to them.

use serde_json::Value;

use crate::config::Config;
use crate::error::PathError;
use crate::id::Id;
use crate::path;

#[derive(Debug, Clone)]
pub struct SchemaEntity {
    pub id: Id,
    pub source: String,
    pub document: Value,
}

#[derive(Debug, Clone)]
pub struct InstanceEntity {
    pub id: Id,
    pub schema_id: String,
    pub source: String,
    pub document: Value,
}

#[derive(Debug, Clone)]
pub enum Entity {
    Schema(SchemaEntity),
    Instance(InstanceEntity),
}

impl Entity {
    /// Builds an entity from a parsed document, reading the configured id
    /// property. The instance key is checked first, then the schema key;
    /// the first recognized key whose value parses as a valid id wins.
    ///
    /// Returns `None` if neither key is present or its value is not a valid id.
    #[must_use]
    pub fn from_document(source: &str, document: Value, cfg: &Config) -> Option<Self> {
        if let Some(raw) = document.get(&cfg.instance_id_key).and_then(Value::as_str)
            && let Ok(id) = Id::parse(raw)
            && id.is_instance()
        {
            let schema_id = id.schema_id();
            return Some(Entity::Instance(InstanceEntity {
                id,
                schema_id,
                source: source.to_owned(),
                document,
            }));
        }

        if let Some(raw) = document.get(&cfg.schema_id_key).and_then(Value::as_str)
            && let Ok(id) = Id::parse(raw)
            && id.is_schema()
        {
            return Some(Entity::Schema(SchemaEntity {
                id,
                source: source.to_owned(),
                document,
            }));
        }

        None
    }

    #[must_use]
    pub fn id(&self) -> &Id {
        match self {
            Entity::Schema(s) => &s.id,
            Entity::Instance(i) => &i.id,
        }
    }

    #[must_use]
    pub fn document(&self) -> &Value {
        match self {
            Entity::Schema(s) => &s.document,
            Entity::Instance(i) => &i.document,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Entity::Schema(s) => &s.source,
            Entity::Instance(i) => &i.source,
        }
    }

    #[must_use]
    pub fn is_schema(&self) -> bool {
        matches!(self, Entity::Schema(_))
    }

    /// Resolves an attribute path against this entity's document and id.
    ///
    /// # Errors
    /// Returns a [`PathError`] if the path is empty, unresolved, or traverses
    /// a non-container value.
    pub fn resolve_path(&self, p: &str) -> Result<Value, PathError> {
        path::resolve(self.document(), self.id(), p)
    }
}
