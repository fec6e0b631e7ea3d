//! # Record Store
//!
//! The in-memory arena of records plus the relationship index derived from
//! them.
//!
//! `RecordAccessor` is the read-only interface processors and callers use
//! to inspect cache state. `RecordStore` is the only implementation that
//! owns data; it applies operations and journals every write while a patch
//! is open so the patch can be undone exactly.

use crate::relationship_index::{InverseRelationship, RelationshipIndex};
use crate::{OrreryError, Record, RecordIdentity, RecordOperation, Relationship};
use std::collections::BTreeMap;

// =============================================================================
// ACCESSOR TRAIT
// =============================================================================

/// Read access to cache state.
pub trait RecordAccessor {
    /// Get a record by identity.
    fn get_record(&self, identity: &RecordIdentity) -> Option<&Record>;

    /// All index entries where `identity` is the referenced record.
    fn get_inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship>;

    /// All records of one model type, in id order.
    fn records_of_type(&self, model: &str) -> Vec<&Record>;

    /// Number of records held.
    fn record_count(&self) -> usize;

    /// Check if a record exists.
    fn has_record(&self, identity: &RecordIdentity) -> bool {
        self.get_record(identity).is_some()
    }

    /// The relationship data of a record, if both exist.
    fn relationship_of(&self, identity: &RecordIdentity, relationship: &str) -> Option<&Relationship> {
        self.get_record(identity)?.relationship(relationship)
    }

    /// The member of a to-one relationship.
    fn related_record(&self, identity: &RecordIdentity, relationship: &str) -> Option<&RecordIdentity> {
        match self.relationship_of(identity, relationship)? {
            Relationship::HasOne(data) => data.as_ref(),
            Relationship::HasMany(_) => None,
        }
    }

    /// The members of a to-many relationship.
    fn related_records(&self, identity: &RecordIdentity, relationship: &str) -> Vec<&RecordIdentity> {
        match self.relationship_of(identity, relationship) {
            Some(Relationship::HasMany(data)) => data.iter().collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// CHANGES
// =============================================================================

/// Who issued an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOrigin {
    /// Part of the batch passed to `patch`.
    Caller,
    /// Emitted by a processor while applying another operation.
    Correction,
}

/// The before and after state of one record touched by an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub identity: RecordIdentity,
    pub previous: Option<Record>,
    pub current: Option<Record>,
}

impl RecordChange {
    /// Whether the operation left the record as it was.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.previous == self.current
    }

    /// Whether the record was removed.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.previous.is_some() && self.current.is_none()
    }
}

/// Apply a field or relationship operation to a record in place.
///
/// Record-level operations (`addRecord`, `updateRecord`, `removeRecord`)
/// are handled by the store itself.
fn apply_to_record(record: &mut Record, op: &RecordOperation) {
    match op {
        RecordOperation::AddRecord { record: payload }
        | RecordOperation::UpdateRecord { record: payload } => record.merge(payload),
        RecordOperation::ReplaceKey { key, value, .. } => {
            record.keys.insert(key.clone(), value.clone());
        }
        RecordOperation::ReplaceAttribute {
            attribute, value, ..
        } => {
            record.attributes.insert(attribute.clone(), value.clone());
        }
        RecordOperation::AddToRelatedRecords {
            relationship,
            related_record,
            ..
        } => {
            record
                .relationships
                .entry(relationship.clone())
                .or_insert_with(Relationship::empty_many)
                .add(related_record.clone());
        }
        RecordOperation::RemoveFromRelatedRecords {
            relationship,
            related_record,
            ..
        } => {
            if let Some(data) = record.relationships.get_mut(relationship) {
                data.remove(related_record);
            }
        }
        RecordOperation::ReplaceRelatedRecords {
            relationship,
            related_records,
            ..
        } => {
            let mut data = Relationship::empty_many();
            for related in related_records {
                data.add(related.clone());
            }
            record.relationships.insert(relationship.clone(), data);
        }
        RecordOperation::ReplaceRelatedRecord {
            relationship,
            related_record,
            ..
        } => {
            record.relationships.insert(
                relationship.clone(),
                Relationship::HasOne(related_record.clone()),
            );
        }
        RecordOperation::RemoveRecord { .. } => {}
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Records by identity, plus the relationship index over them.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<RecordIdentity, Record>,
    index: RelationshipIndex,
    /// Previous value of every record written since `begin`.
    journal: Option<Vec<(RecordIdentity, Option<Record>)>>,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The relationship index.
    #[must_use]
    pub fn index(&self) -> &RelationshipIndex {
        &self.index
    }

    /// Mutable access to the relationship index, for index maintenance.
    pub fn index_mut(&mut self) -> &mut RelationshipIndex {
        &mut self.index
    }

    /// Iterate every record in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one operation to the record data.
    ///
    /// The index is not touched; index maintenance happens from the returned
    /// change. Returns `Ok(None)` when a corrective operation has nothing to
    /// act on.
    pub fn apply(
        &mut self,
        op: &RecordOperation,
        origin: OperationOrigin,
    ) -> Result<Option<RecordChange>, OrreryError> {
        let identity = op.record();
        let previous = self.records.get(identity);

        if previous.is_none() && !matches!(op, RecordOperation::AddRecord { .. }) {
            match (origin, op) {
                (OperationOrigin::Caller, _) => {
                    return Err(OrreryError::RecordNotFound(identity.clone()));
                }
                (
                    OperationOrigin::Correction,
                    RecordOperation::RemoveRecord { .. }
                    | RecordOperation::RemoveFromRelatedRecords { .. },
                ) => return Ok(None),
                (OperationOrigin::Correction, _) => {}
            }
        }

        let next = match op {
            RecordOperation::RemoveRecord { .. } => None,
            _ => {
                let mut record = previous
                    .cloned()
                    .unwrap_or_else(|| Record::new(identity.clone()));
                apply_to_record(&mut record, op);
                Some(record)
            }
        };

        Ok(Some(self.write(identity.clone(), next)))
    }

    /// Replace the stored value of one record, journaling the old value.
    fn write(&mut self, identity: RecordIdentity, next: Option<Record>) -> RecordChange {
        let previous = match next.clone() {
            Some(record) => self.records.insert(identity.clone(), record),
            None => self.records.remove(&identity),
        };
        if let Some(journal) = self.journal.as_mut() {
            journal.push((identity.clone(), previous.clone()));
        }
        RecordChange {
            identity,
            previous,
            current: next,
        }
    }

    // =========================================================================
    // JOURNAL
    // =========================================================================

    /// Open a journal over records and index.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
        self.index.begin();
    }

    /// Close the journal, keeping every write.
    pub fn commit(&mut self) {
        self.journal = None;
        self.index.commit();
    }

    /// Close the journal, restoring records and index to their state at
    /// `begin`.
    pub fn rollback(&mut self) {
        if let Some(journal) = self.journal.take() {
            for (identity, previous) in journal.into_iter().rev() {
                match previous {
                    Some(record) => {
                        self.records.insert(identity, record);
                    }
                    None => {
                        self.records.remove(&identity);
                    }
                }
            }
        }
        self.index.rollback();
    }

    /// Drop every record and index entry.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.journal = None;
    }
}

impl RecordAccessor for RecordStore {
    fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(identity)
    }

    fn get_inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.index.get(identity)
    }

    fn records_of_type(&self, model: &str) -> Vec<&Record> {
        self.records
            .values()
            .filter(|record| record.identity.model == model)
            .collect()
    }

    fn record_count(&self) -> usize {
        self.records.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
