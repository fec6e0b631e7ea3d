//! # Relationship Index
//!
//! A derived reverse map answering "which records currently reference
//! record X, and through which relationship".
//!
//! Entries are keyed by the referenced record. The index is a pure function
//! of the relationship data stored on records: it is updated from record
//! changes by diffing the before and after relationship data, never by
//! interpreting operations directly.
//!
//! Uses `BTreeMap`/`BTreeSet` exclusively for deterministic ordering.

use crate::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ENTRY
// =============================================================================

/// `record.relationship` currently contains `related_record`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverseRelationship {
    /// The referencing record.
    pub record: RecordIdentity,
    /// The relationship on the referencing record.
    pub relationship: String,
    /// The referenced record.
    pub related_record: RecordIdentity,
}

impl InverseRelationship {
    /// Create a new entry.
    #[must_use]
    pub fn new(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        Self {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }
}

/// Collect every entry implied by a record's relationship data.
fn entries_of(record: Option<&Record>) -> BTreeSet<InverseRelationship> {
    let Some(record) = record else {
        return BTreeSet::new();
    };
    record
        .relationships
        .iter()
        .flat_map(|(name, relationship)| {
            relationship.members().map(move |related| {
                InverseRelationship::new(record.identity.clone(), name.clone(), related.clone())
            })
        })
        .collect()
}

// =============================================================================
// INDEX
// =============================================================================

#[derive(Debug, Clone)]
enum IndexEdit {
    Added(InverseRelationship),
    Removed(InverseRelationship),
}

/// Reverse-relationship multimap, keyed by the referenced record.
///
/// While a journal is open every edit is recorded so the index can be
/// returned to its exact state at `begin`.
#[derive(Debug, Clone, Default)]
pub struct RelationshipIndex {
    entries: BTreeMap<RecordIdentity, BTreeSet<InverseRelationship>>,
    journal: Option<Vec<IndexEdit>>,
}

impl RelationshipIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from scratch for a set of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut index = Self::new();
        for record in records {
            for entry in entries_of(Some(record)) {
                index.insert(entry);
            }
        }
        index
    }

    /// All entries where `identity` is the referenced record.
    #[must_use]
    pub fn get(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.referencing(identity).cloned().collect()
    }

    /// Iterate entries where `identity` is the referenced record.
    pub fn referencing(
        &self,
        identity: &RecordIdentity,
    ) -> impl Iterator<Item = &InverseRelationship> + '_ {
        self.entries.get(identity).into_iter().flatten()
    }

    /// Check for an exact entry.
    #[must_use]
    pub fn contains(&self, entry: &InverseRelationship) -> bool {
        self.entries
            .get(&entry.related_record)
            .is_some_and(|set| set.contains(entry))
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Check whether the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate every entry in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &InverseRelationship> + '_ {
        self.entries.values().flatten()
    }

    /// Insert an entry. Returns `true` if it was not present.
    pub fn insert(&mut self, entry: InverseRelationship) -> bool {
        let inserted = self
            .entries
            .entry(entry.related_record.clone())
            .or_default()
            .insert(entry.clone());
        if inserted {
            self.record_edit(IndexEdit::Added(entry));
        }
        inserted
    }

    /// Remove an entry. Returns `true` if it was present.
    pub fn remove(&mut self, entry: &InverseRelationship) -> bool {
        let Some(set) = self.entries.get_mut(&entry.related_record) else {
            return false;
        };
        let removed = set.remove(entry);
        if set.is_empty() {
            self.entries.remove(&entry.related_record);
        }
        if removed {
            self.record_edit(IndexEdit::Removed(entry.clone()));
        }
        removed
    }

    /// Bring the index in line with a record change, touching only the
    /// entries whose presence differs between `previous` and `current`.
    pub fn apply_change(&mut self, previous: Option<&Record>, current: Option<&Record>) {
        let before = entries_of(previous);
        let after = entries_of(current);

        for stale in before.difference(&after) {
            self.remove(stale);
        }
        for fresh in after.difference(&before) {
            self.insert(fresh.clone());
        }
    }

    /// Remove every entry where `identity` is the referenced record.
    pub fn purge_referencing(&mut self, identity: &RecordIdentity) -> usize {
        let Some(set) = self.entries.remove(identity) else {
            return 0;
        };
        let count = set.len();
        if let Some(journal) = self.journal.as_mut() {
            journal.extend(set.into_iter().map(IndexEdit::Removed));
        }
        count
    }

    // =========================================================================
    // JOURNAL
    // =========================================================================

    /// Start recording edits.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Stop recording and keep all edits.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Stop recording and undo every edit made since `begin`.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for edit in journal.into_iter().rev() {
            match edit {
                IndexEdit::Added(entry) => {
                    self.remove(&entry);
                }
                IndexEdit::Removed(entry) => {
                    self.insert(entry);
                }
            }
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.journal = None;
    }

    fn record_edit(&mut self, edit: IndexEdit) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(edit);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
