//! Keeps the relationship index in step with the record store.

use super::OperationProcessor;
use crate::relationship_index::RelationshipIndex;
use crate::store::RecordChange;

/// Maintains the relationship index. Never rejects or emits operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityProcessor;

impl OperationProcessor for IntegrityProcessor {
    fn name(&self) -> &'static str {
        "integrity"
    }

    fn immediate(&self, index: &mut RelationshipIndex, change: &RecordChange) {
        index.apply_change(change.previous.as_ref(), change.current.as_ref());
        if change.is_removal() {
            let purged = index.purge_referencing(&change.identity);
            if purged > 0 {
                tracing::trace!(record = %change.identity, purged, "purged incoming index entries");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Record, RecordIdentity};

    fn jupiter() -> RecordIdentity {
        RecordIdentity::new("planet", "jupiter")
    }

    fn io() -> RecordIdentity {
        RecordIdentity::new("moon", "io")
    }

    #[test]
    fn removal_clears_outgoing_and_incoming_entries() {
        let mut index = RelationshipIndex::new();
        let planet = Record::new(jupiter()).with_has_many("moons", [io()]);
        let moon = Record::new(io()).with_has_one("planet", Some(jupiter()));
        index.apply_change(None, Some(&planet));
        index.apply_change(None, Some(&moon));

        IntegrityProcessor.immediate(
            &mut index,
            &RecordChange {
                identity: jupiter(),
                previous: Some(planet),
                current: None,
            },
        );

        assert!(index.get(&io()).is_empty());
        assert!(index.get(&jupiter()).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn update_indexes_delta() {
        let mut index = RelationshipIndex::new();
        let before = Record::new(io()).with_has_one("planet", None);
        let after = Record::new(io()).with_has_one("planet", Some(jupiter()));

        IntegrityProcessor.immediate(
            &mut index,
            &RecordChange {
                identity: io(),
                previous: Some(before),
                current: Some(after),
            },
        );

        assert_eq!(index.get(&jupiter()).len(), 1);
    }
}
