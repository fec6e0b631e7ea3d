//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the cache:
//! - Record identifiers (`RecordIdentity`)
//! - Record payloads (`Record`, `Relationship`)
//! - Validation reporting (`ValidationIssue`, `ValidationError`)
//! - Error types (`OrreryError`)
//!
//! ## Determinism Guarantees
//!
//! All maps are `BTreeMap` and all identifiers implement `Ord`, so iteration
//! order (and therefore the order of emitted operations) never depends on
//! hashing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// =============================================================================
// RECORD IDENTITY
// =============================================================================

/// Identifies a record by its model type and id.
///
/// Identities are immutable and compared structurally. Relationships store
/// identities rather than references, so cyclic graphs need no special care.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// The model type of the record.
    #[serde(rename = "type")]
    pub model: String,
    /// The id of the record, unique within its model.
    pub id: String,
}

impl RecordIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

// =============================================================================
// RELATIONSHIP
// =============================================================================

/// The data held by a relationship on a record.
///
/// To-many data is a set: duplicates are never stored and equality ignores
/// order. Insertion order is retained so output stays stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RelationshipDocument", into = "RelationshipDocument")]
pub enum Relationship {
    /// A single, nullable reference.
    HasOne(Option<RecordIdentity>),
    /// A set of references.
    HasMany(Vec<RecordIdentity>),
}

impl Relationship {
    /// An empty to-many relationship.
    #[must_use]
    pub const fn empty_many() -> Self {
        Self::HasMany(Vec::new())
    }

    /// Whether this is the to-many form.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        matches!(self, Self::HasMany(_))
    }

    /// All identities referenced by this relationship.
    pub fn members(&self) -> impl Iterator<Item = &RecordIdentity> + '_ {
        let (one, many) = match self {
            Self::HasOne(data) => (data.as_ref(), &[][..]),
            Self::HasMany(data) => (None, data.as_slice()),
        };
        one.into_iter().chain(many.iter())
    }

    /// The referenced identities as a set.
    #[must_use]
    pub fn member_set(&self) -> BTreeSet<RecordIdentity> {
        self.members().cloned().collect()
    }

    /// Check whether `identity` is referenced.
    #[must_use]
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.members().any(|member| member == identity)
    }

    /// Add a member to a to-many relationship. Returns `true` if it was added.
    ///
    /// A to-one relationship is overwritten with the identity.
    pub fn add(&mut self, identity: RecordIdentity) -> bool {
        match self {
            Self::HasMany(data) => {
                if data.contains(&identity) {
                    false
                } else {
                    data.push(identity);
                    true
                }
            }
            Self::HasOne(data) => {
                let changed = data.as_ref() != Some(&identity);
                *data = Some(identity);
                changed
            }
        }
    }

    /// Remove a member. Returns `true` if it was present.
    pub fn remove(&mut self, identity: &RecordIdentity) -> bool {
        match self {
            Self::HasMany(data) => {
                let before = data.len();
                data.retain(|member| member != identity);
                data.len() != before
            }
            Self::HasOne(data) => {
                if data.as_ref() == Some(identity) {
                    *data = None;
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::HasOne(a), Self::HasOne(b)) => a == b,
            (Self::HasMany(a), Self::HasMany(b)) => {
                a.len() == b.len() && self.member_set() == other.member_set()
            }
            _ => false,
        }
    }
}

impl Eq for Relationship {}

/// Wire shape of a relationship: `{"data": null | {..} | [..]}`.
#[derive(Serialize, Deserialize)]
struct RelationshipDocument {
    data: RelationshipData,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RelationshipData {
    Many(Vec<RecordIdentity>),
    One(Option<RecordIdentity>),
}

impl From<RelationshipDocument> for Relationship {
    fn from(doc: RelationshipDocument) -> Self {
        match doc.data {
            RelationshipData::Many(mut data) => {
                let mut seen = BTreeSet::new();
                data.retain(|member| seen.insert(member.clone()));
                Self::HasMany(data)
            }
            RelationshipData::One(data) => Self::HasOne(data),
        }
    }
}

impl From<Relationship> for RelationshipDocument {
    fn from(relationship: Relationship) -> Self {
        let data = match relationship {
            Relationship::HasOne(data) => RelationshipData::One(data),
            Relationship::HasMany(data) => RelationshipData::Many(data),
        };
        Self { data }
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A typed, identified entity with attributes, keys, and relationships.
///
/// Empty maps mean "nothing declared". Inside an operation payload, a field
/// that is absent is left untouched when the payload is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The identity of the record.
    #[serde(flatten)]
    pub identity: RecordIdentity,
    /// Attribute values by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    /// Externally-sourced identifiers by key name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
    /// Relationship data by relationship name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Record {
    /// Create a record with no fields.
    #[must_use]
    pub fn new(identity: RecordIdentity) -> Self {
        Self {
            identity,
            attributes: BTreeMap::new(),
            keys: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Builder: set an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder: set a key.
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    /// Builder: set a to-one relationship.
    #[must_use]
    pub fn with_has_one(
        mut self,
        name: impl Into<String>,
        related: Option<RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), Relationship::HasOne(related));
        self
    }

    /// Builder: set a to-many relationship.
    #[must_use]
    pub fn with_has_many(
        mut self,
        name: impl Into<String>,
        related: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        let mut relationship = Relationship::empty_many();
        for identity in related {
            relationship.add(identity);
        }
        self.relationships.insert(name.into(), relationship);
        self
    }

    /// Get an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get relationship data.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Merge `payload` into this record. Every field present in the payload
    /// replaces the field here; fields absent from the payload are kept.
    pub fn merge(&mut self, payload: &Record) {
        for (name, value) in &payload.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        for (name, value) in &payload.keys {
            self.keys.insert(name.clone(), value.clone());
        }
        for (name, relationship) in &payload.relationships {
            self.relationships
                .insert(name.clone(), relationship.clone());
        }
    }
}

// =============================================================================
// VALIDATION REPORTING
// =============================================================================

/// The category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationIssueKind {
    /// The attribute is not declared on the model.
    UnknownAttribute,
    /// The key is not declared on the model.
    UnknownKey,
    /// The relationship is not declared on the model.
    UnknownRelationship,
    /// The related record's type is not accepted by the relationship.
    RelatedTypeMismatch,
    /// To-one data or operation used on a to-many relationship, or vice versa.
    RelationshipKindMismatch,
    /// The attribute value does not match the declared attribute type.
    AttributeTypeMismatch,
}

/// One problem found while validating an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// What went wrong.
    pub kind: ValidationIssueKind,
    /// The record the operation targets.
    pub record: RecordIdentity,
    /// The attribute, key, or relationship name involved.
    pub field: String,
    /// Human-readable description.
    pub description: String,
}

impl ValidationIssue {
    /// Create a new issue.
    #[must_use]
    pub fn new(
        kind: ValidationIssueKind,
        record: &RecordIdentity,
        field: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            record: record.clone(),
            field: field.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.record, self.field, self.description)
    }
}

/// All issues found while validating a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation issue(s): {}", .issues.len(), join_issues(.issues))]
pub struct ValidationError {
    /// The collected issues, in the order they were found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Check whether any issue has the given kind.
    #[must_use]
    pub fn has_kind(&self, kind: ValidationIssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the orrery cache.
///
/// - Schema errors are fatal for the offending operation
/// - Validation errors aggregate every issue of one operation
/// - Store errors are recoverable; the patch that raised them had no effect
#[derive(Debug, Error)]
pub enum OrreryError {
    /// An operation or schema references an undeclared model.
    #[error("Model not defined: {model}")]
    ModelNotDefined { model: String },

    /// The attribute is not declared on the model.
    #[error("Attribute not defined: {model}.{attribute}")]
    AttributeNotDefined { model: String, attribute: String },

    /// The key is not declared on the model.
    #[error("Key not defined: {model}.{key}")]
    KeyNotDefined { model: String, key: String },

    /// The relationship is not declared on the model.
    #[error("Relationship not defined: {model}.{relationship}")]
    RelationshipNotDefined { model: String, relationship: String },

    /// The schema is internally inconsistent.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// An operation failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation targets a record that is not in the cache.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordIdentity),

    /// A relationship would point at a record that is not in the cache.
    #[error("Dangling reference: {record}.{relationship} -> {related_record}")]
    DanglingReference {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },

    /// The input batch exceeds the configured limit.
    #[error("Patch too large: {len} operations (max {max})")]
    PatchTooLarge { len: usize, max: usize },

    /// A corrective step failed. Indicates an index or schema bug.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl OrreryError {
    /// Shorthand for `ModelNotDefined`.
    pub fn model_not_defined(model: impl Into<String>) -> Self {
        Self::ModelNotDefined {
            model: model.into(),
        }
    }

    /// Whether this error came from schema validation (either severity).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::ModelNotDefined { .. })
    }
}

impl From<serde_json::Error> for OrreryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for OrreryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
