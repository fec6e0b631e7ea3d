//! # Record Operations
//!
//! The closed set of record mutations. Every change to the cache, whether
//! issued by a caller or emitted as a correction, is one of these values.
//!
//! Operations serialize as `{"op": "<kind>", "record": .., ..}` with
//! camelCase field names, so a patch can be logged and replayed verbatim.

use crate::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single record mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordOperation {
    /// Create a record (merging into an existing one with the same identity).
    AddRecord { record: Record },
    /// Merge the payload's fields into an existing record.
    UpdateRecord { record: Record },
    /// Remove a record.
    RemoveRecord { record: RecordIdentity },
    /// Set one key.
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: String,
    },
    /// Set one attribute.
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },
    /// Add a member to a to-many relationship.
    AddToRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    /// Remove a member from a to-many relationship.
    RemoveFromRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    /// Replace all members of a to-many relationship.
    ReplaceRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_records: Vec<RecordIdentity>,
    },
    /// Replace a to-one relationship.
    ReplaceRelatedRecord {
        record: RecordIdentity,
        relationship: String,
        related_record: Option<RecordIdentity>,
    },
}

/// Field-less discriminant of `RecordOperation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    AddRecord,
    UpdateRecord,
    RemoveRecord,
    ReplaceKey,
    ReplaceAttribute,
    AddToRelatedRecords,
    RemoveFromRelatedRecords,
    ReplaceRelatedRecords,
    ReplaceRelatedRecord,
}

impl OperationKind {
    /// The wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddRecord => "addRecord",
            Self::UpdateRecord => "updateRecord",
            Self::RemoveRecord => "removeRecord",
            Self::ReplaceKey => "replaceKey",
            Self::ReplaceAttribute => "replaceAttribute",
            Self::AddToRelatedRecords => "addToRelatedRecords",
            Self::RemoveFromRelatedRecords => "removeFromRelatedRecords",
            Self::ReplaceRelatedRecords => "replaceRelatedRecords",
            Self::ReplaceRelatedRecord => "replaceRelatedRecord",
        }
    }

    /// Operations that overwrite one field of a record.
    #[must_use]
    pub const fn is_replace_field(self) -> bool {
        matches!(
            self,
            Self::ReplaceKey
                | Self::ReplaceAttribute
                | Self::ReplaceRelatedRecord
                | Self::ReplaceRelatedRecords
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RecordOperation {
    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    pub fn add_record(record: Record) -> Self {
        Self::AddRecord { record }
    }

    pub fn update_record(record: Record) -> Self {
        Self::UpdateRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        Self::RemoveRecord { record }
    }

    pub fn replace_key(record: RecordIdentity, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ReplaceKey {
            record,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn replace_attribute(
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn add_to_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        Self::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn remove_from_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        Self::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn replace_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: Vec<RecordIdentity>,
    ) -> Self {
        Self::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records,
        }
    }

    pub fn replace_related_record(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> Self {
        Self::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// The kind of this operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::AddRecord { .. } => OperationKind::AddRecord,
            Self::UpdateRecord { .. } => OperationKind::UpdateRecord,
            Self::RemoveRecord { .. } => OperationKind::RemoveRecord,
            Self::ReplaceKey { .. } => OperationKind::ReplaceKey,
            Self::ReplaceAttribute { .. } => OperationKind::ReplaceAttribute,
            Self::AddToRelatedRecords { .. } => OperationKind::AddToRelatedRecords,
            Self::RemoveFromRelatedRecords { .. } => OperationKind::RemoveFromRelatedRecords,
            Self::ReplaceRelatedRecords { .. } => OperationKind::ReplaceRelatedRecords,
            Self::ReplaceRelatedRecord { .. } => OperationKind::ReplaceRelatedRecord,
        }
    }

    /// The identity of the record this operation targets.
    #[must_use]
    pub fn record(&self) -> &RecordIdentity {
        match self {
            Self::AddRecord { record } | Self::UpdateRecord { record } => &record.identity,
            Self::RemoveRecord { record }
            | Self::ReplaceKey { record, .. }
            | Self::ReplaceAttribute { record, .. }
            | Self::AddToRelatedRecords { record, .. }
            | Self::RemoveFromRelatedRecords { record, .. }
            | Self::ReplaceRelatedRecords { record, .. }
            | Self::ReplaceRelatedRecord { record, .. } => record,
        }
    }

    /// The relationship named by a relationship operation.
    #[must_use]
    pub fn relationship(&self) -> Option<&str> {
        match self {
            Self::AddToRelatedRecords { relationship, .. }
            | Self::RemoveFromRelatedRecords { relationship, .. }
            | Self::ReplaceRelatedRecords { relationship, .. }
            | Self::ReplaceRelatedRecord { relationship, .. } => Some(relationship),
            _ => None,
        }
    }

    /// Every related identity this operation mentions, in payload order.
    #[must_use]
    pub fn related_records(&self) -> Vec<&RecordIdentity> {
        match self {
            Self::AddRecord { record } | Self::UpdateRecord { record } => record
                .relationships
                .values()
                .flat_map(|relationship| relationship.members())
                .collect(),
            Self::AddToRelatedRecords { related_record, .. }
            | Self::RemoveFromRelatedRecords { related_record, .. } => vec![related_record],
            Self::ReplaceRelatedRecords { related_records, .. } => related_records.iter().collect(),
            Self::ReplaceRelatedRecord { related_record, .. } => related_record.iter().collect(),
            Self::RemoveRecord { .. } | Self::ReplaceKey { .. } | Self::ReplaceAttribute { .. } => {
                Vec::new()
            }
        }
    }
}

impl fmt::Display for RecordOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.record())?;
        match self {
            Self::ReplaceKey { key, .. } => write!(f, " key={key}"),
            Self::ReplaceAttribute { attribute, .. } => write!(f, " attribute={attribute}"),
            Self::AddToRelatedRecords {
                relationship,
                related_record,
                ..
            }
            | Self::RemoveFromRelatedRecords {
                relationship,
                related_record,
                ..
            } => write!(f, " {relationship}={related_record}"),
            Self::ReplaceRelatedRecords {
                relationship,
                related_records,
                ..
            } => write!(f, " {relationship}=[{} record(s)]", related_records.len()),
            Self::ReplaceRelatedRecord {
                relationship,
                related_record,
                ..
            } => match related_record {
                Some(related) => write!(f, " {relationship}={related}"),
                None => write!(f, " {relationship}=null"),
            },
            Self::AddRecord { .. } | Self::UpdateRecord { .. } | Self::RemoveRecord { .. } => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
