//! # Schema Validation
//!
//! Rejects operations whose shape does not fit the schema before any of the
//! batch touches the store.
//!
//! Two severities:
//! - An undeclared model, on the operation's record or on any related
//!   record, fails immediately with `ModelNotDefined`.
//! - Every other problem is collected as a `ValidationIssue`; all issues of
//!   one operation are raised together as a single `ValidationError`.

use super::OperationProcessor;
use crate::schema::{ModelDefinition, RelationshipKind};
use crate::{
    OrreryError, Record, RecordIdentity, RecordOperation, Relationship, Schema, ValidationError,
    ValidationIssue, ValidationIssueKind,
};
use serde_json::Value;

/// Validates operations against the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidationProcessor;

impl OperationProcessor for SchemaValidationProcessor {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn validate(&self, schema: &Schema, op: &RecordOperation) -> Result<(), OrreryError> {
        validate_operation(schema, op)
    }
}

/// Check one operation against the schema.
pub fn validate_operation(schema: &Schema, op: &RecordOperation) -> Result<(), OrreryError> {
    let record = op.record();
    let model = schema.model(&record.model)?;
    for related in op.related_records() {
        schema.model(&related.model)?;
    }

    let mut checker = Checker {
        model,
        record,
        issues: Vec::new(),
    };

    match op {
        RecordOperation::AddRecord { record: payload }
        | RecordOperation::UpdateRecord { record: payload } => checker.record_payload(payload),
        RecordOperation::RemoveRecord { .. } => {}
        RecordOperation::ReplaceKey { key, .. } => checker.key(key),
        RecordOperation::ReplaceAttribute {
            attribute, value, ..
        } => checker.attribute(attribute, value),
        RecordOperation::AddToRelatedRecords {
            relationship,
            related_record,
            ..
        }
        | RecordOperation::RemoveFromRelatedRecords {
            relationship,
            related_record,
            ..
        } => checker.relationship(
            relationship,
            RelationshipKind::HasMany,
            std::iter::once(related_record),
        ),
        RecordOperation::ReplaceRelatedRecords {
            relationship,
            related_records,
            ..
        } => checker.relationship(relationship, RelationshipKind::HasMany, related_records.iter()),
        RecordOperation::ReplaceRelatedRecord {
            relationship,
            related_record,
            ..
        } => checker.relationship(relationship, RelationshipKind::HasOne, related_record.iter()),
    }

    if checker.issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            issues: checker.issues,
        }
        .into())
    }
}

/// Collects issues for one operation on one record.
struct Checker<'a> {
    model: &'a ModelDefinition,
    record: &'a RecordIdentity,
    issues: Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn issue(&mut self, kind: ValidationIssueKind, field: &str, description: String) {
        self.issues
            .push(ValidationIssue::new(kind, self.record, field, description));
    }

    fn record_payload(&mut self, payload: &Record) {
        for (name, value) in &payload.attributes {
            self.attribute(name, value);
        }
        for name in payload.keys.keys() {
            self.key(name);
        }
        for (name, data) in &payload.relationships {
            let kind = match data {
                Relationship::HasOne(_) => RelationshipKind::HasOne,
                Relationship::HasMany(_) => RelationshipKind::HasMany,
            };
            self.relationship(name, kind, data.members());
        }
    }

    fn attribute(&mut self, name: &str, value: &Value) {
        let Some(definition) = self.model.attributes.get(name) else {
            self.issue(
                ValidationIssueKind::UnknownAttribute,
                name,
                format!("attribute '{name}' is not defined on '{}'", self.record.model),
            );
            return;
        };
        let Some(expected) = definition.attribute_type else {
            return;
        };
        if !value.is_null() && !expected.accepts(value) {
            self.issue(
                ValidationIssueKind::AttributeTypeMismatch,
                name,
                format!("expected {expected:?} value, got {value}"),
            );
        }
    }

    fn key(&mut self, name: &str) {
        if !self.model.keys.contains_key(name) {
            self.issue(
                ValidationIssueKind::UnknownKey,
                name,
                format!("key '{name}' is not defined on '{}'", self.record.model),
            );
        }
    }

    fn relationship<'r>(
        &mut self,
        name: &str,
        kind: RelationshipKind,
        related: impl Iterator<Item = &'r RecordIdentity>,
    ) {
        let Some(definition) = self.model.relationships.get(name) else {
            self.issue(
                ValidationIssueKind::UnknownRelationship,
                name,
                format!("relationship '{name}' is not defined on '{}'", self.record.model),
            );
            return;
        };
        if definition.kind != kind {
            self.issue(
                ValidationIssueKind::RelationshipKindMismatch,
                name,
                format!("relationship '{name}' is {:?}, operation expects {kind:?}", definition.kind),
            );
        }
        for identity in related {
            if !definition.related_type.accepts(&identity.model) {
                self.issue(
                    ValidationIssueKind::RelatedTypeMismatch,
                    name,
                    format!(
                        "'{}' is not an accepted type (expected one of {:?})",
                        identity.model,
                        definition.related_type.models()
                    ),
                );
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
