//! # Schema
//!
//! Read-only model definitions consulted by the validation and consistency
//! processors.
//!
//! A schema is loaded once (JSON or TOML) and checked for internal
//! consistency when it is built: every declared `inverse` must exist on each
//! allowed related model and must point back at the declaring relationship.

use crate::primitives::SCHEMA_VERSION;
use crate::{OrreryError, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// DEFINITIONS
// =============================================================================

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    Object,
    Array,
}

impl AttributeType {
    /// Check a non-null value against this type.
    ///
    /// Dates travel as strings; their format belongs to the serializer.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String | Self::Date | Self::DateTime => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Definition of a single attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Optional declared type. Untyped attributes accept any value.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<AttributeType>,
}

/// Definition of a single key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "hasOne")]
    HasOne,
    #[serde(rename = "hasMany")]
    HasMany,
}

/// What happens to related records when the owning record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependentAction {
    Remove,
}

/// The model type(s) a relationship may point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedType {
    Single(String),
    Polymorphic(Vec<String>),
}

impl RelatedType {
    /// All accepted model names.
    #[must_use]
    pub fn models(&self) -> &[String] {
        match self {
            Self::Single(model) => std::slice::from_ref(model),
            Self::Polymorphic(models) => models,
        }
    }

    /// Check whether records of `model` are accepted.
    #[must_use]
    pub fn accepts(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }
}

/// Definition of a single relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    /// To-one or to-many.
    pub kind: RelationshipKind,
    /// Accepted related model type(s).
    #[serde(rename = "type")]
    pub related_type: RelatedType,
    /// Name of the mirroring relationship on the related model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    /// Cascading behaviour when the owner is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<DependentAction>,
}

impl RelationshipDefinition {
    /// A to-one relationship to `model`.
    #[must_use]
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            related_type: RelatedType::Single(model.into()),
            inverse: None,
            dependent: None,
        }
    }

    /// A to-many relationship to `model`.
    #[must_use]
    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            related_type: RelatedType::Single(model.into()),
            inverse: None,
            dependent: None,
        }
    }

    /// A to-one relationship accepting any of `models`.
    #[must_use]
    pub fn has_one_polymorphic<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RelationshipKind::HasOne,
            related_type: RelatedType::Polymorphic(models.into_iter().map(Into::into).collect()),
            inverse: None,
            dependent: None,
        }
    }

    /// Builder: declare the inverse relationship.
    #[must_use]
    pub fn inverse(mut self, name: impl Into<String>) -> Self {
        self.inverse = Some(name.into());
        self
    }

    /// Builder: cascade removal to related records.
    #[must_use]
    pub fn dependent_remove(mut self) -> Self {
        self.dependent = Some(DependentAction::Remove);
        self
    }

    /// Whether related records are removed with the owner.
    #[must_use]
    pub fn removes_dependents(&self) -> bool {
        self.dependent == Some(DependentAction::Remove)
    }
}

/// Definition of one model type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub keys: BTreeMap<String, KeyDefinition>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDefinition>,
}

impl ModelDefinition {
    /// Create an empty model definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declare an untyped attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into(), AttributeDefinition::default());
        self
    }

    /// Builder: declare a typed attribute.
    #[must_use]
    pub fn typed_attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeDefinition {
                attribute_type: Some(attribute_type),
            },
        );
        self
    }

    /// Builder: declare a key.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyDefinition::default());
        self
    }

    /// Builder: declare a relationship.
    #[must_use]
    pub fn relationship(mut self, name: impl Into<String>, definition: RelationshipDefinition) -> Self {
        self.relationships.insert(name.into(), definition);
        self
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// The set of model definitions known to a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument")]
pub struct Schema {
    version: u32,
    models: BTreeMap<String, ModelDefinition>,
}

#[derive(Deserialize)]
struct SchemaDocument {
    #[serde(default = "default_version")]
    version: u32,
    models: BTreeMap<String, ModelDefinition>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl TryFrom<SchemaDocument> for Schema {
    type Error = OrreryError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        Self::with_version(doc.version, doc.models)
    }
}

impl Schema {
    /// Build a schema from model definitions, checking inverse declarations.
    pub fn new(models: BTreeMap<String, ModelDefinition>) -> Result<Self, OrreryError> {
        Self::with_version(SCHEMA_VERSION, models)
    }

    /// Build a schema with an explicit version number.
    pub fn with_version(
        version: u32,
        models: BTreeMap<String, ModelDefinition>,
    ) -> Result<Self, OrreryError> {
        let schema = Self { version, models };
        schema.check_relationships()?;
        Ok(schema)
    }

    /// Parse a JSON schema document.
    pub fn from_json_str(json: &str) -> Result<Self, OrreryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a TOML schema document.
    pub fn from_toml_str(source: &str) -> Result<Self, OrreryError> {
        toml::from_str(source).map_err(|e| OrreryError::Serialization(e.to_string()))
    }

    /// Schema version. Upgrades are handled outside the cache.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// All declared model names, sorted.
    pub fn model_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.models.keys().map(String::as_str)
    }

    /// Whether the model is declared.
    #[must_use]
    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Get a model definition.
    pub fn model(&self, model: &str) -> Result<&ModelDefinition, OrreryError> {
        self.models
            .get(model)
            .ok_or_else(|| OrreryError::model_not_defined(model))
    }

    /// Whether the attribute is declared on the model.
    #[must_use]
    pub fn has_attribute(&self, model: &str, attribute: &str) -> bool {
        self.models
            .get(model)
            .is_some_and(|def| def.attributes.contains_key(attribute))
    }

    /// Whether the key is declared on the model.
    #[must_use]
    pub fn has_key(&self, model: &str, key: &str) -> bool {
        self.models
            .get(model)
            .is_some_and(|def| def.keys.contains_key(key))
    }

    /// Get an attribute definition.
    pub fn attribute(&self, model: &str, attribute: &str) -> Result<&AttributeDefinition, OrreryError> {
        self.model(model)?
            .attributes
            .get(attribute)
            .ok_or_else(|| OrreryError::AttributeNotDefined {
                model: model.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Get a key definition.
    pub fn key(&self, model: &str, key: &str) -> Result<&KeyDefinition, OrreryError> {
        self.model(model)?
            .keys
            .get(key)
            .ok_or_else(|| OrreryError::KeyNotDefined {
                model: model.to_string(),
                key: key.to_string(),
            })
    }

    /// Get a relationship definition.
    pub fn relationship(
        &self,
        model: &str,
        relationship: &str,
    ) -> Result<&RelationshipDefinition, OrreryError> {
        self.model(model)?
            .relationships
            .get(relationship)
            .ok_or_else(|| OrreryError::RelationshipNotDefined {
                model: model.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// Resolve the inverse of `model.relationship` as seen from `related`.
    ///
    /// Returns the inverse relationship name and its definition on the
    /// related record's model, or `None` when no inverse is declared.
    pub fn inverse_relationship(
        &self,
        model: &str,
        relationship: &str,
        related: &RecordIdentity,
    ) -> Result<Option<(&str, &RelationshipDefinition)>, OrreryError> {
        let definition = self.relationship(model, relationship)?;
        let Some(inverse) = definition.inverse.as_deref() else {
            return Ok(None);
        };
        let inverse_def = self.relationship(&related.model, inverse)?;
        Ok(Some((inverse, inverse_def)))
    }

    fn check_relationships(&self) -> Result<(), OrreryError> {
        for (model, definition) in &self.models {
            for (name, relationship) in &definition.relationships {
                for related in relationship.related_type.models() {
                    let related_def = self.models.get(related).ok_or_else(|| {
                        OrreryError::InvalidSchema(format!(
                            "{model}.{name} points at undeclared model '{related}'"
                        ))
                    })?;

                    let Some(inverse) = relationship.inverse.as_deref() else {
                        continue;
                    };
                    let inverse_def = related_def.relationships.get(inverse).ok_or_else(|| {
                        OrreryError::InvalidSchema(format!(
                            "{model}.{name} declares inverse '{inverse}' missing on '{related}'"
                        ))
                    })?;
                    if !inverse_def.related_type.accepts(model)
                        || inverse_def.inverse.as_deref() != Some(name.as_str())
                    {
                        return Err(OrreryError::InvalidSchema(format!(
                            "{related}.{inverse} does not mirror {model}.{name}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
