//! # Operation Coalescing
//!
//! Reduces an ordered list of operations to a shorter list with the same
//! observable effect. Surviving operations keep their relative order; the
//! only rewrite is folding a later field write into an earlier operation's
//! record payload.
//!
//! Each operation scans forward over the operations after it. While no
//! surviving, unmerged operation on the same record has been seen the scan
//! is *consecutive*, and any field write may fold backwards. Once the scan
//! is no longer consecutive only attribute writes may fold, since moving a
//! relationship write past another write to the same record could reorder
//! their effects.
//!
//! Cancellation:
//! - `addRecord` followed by `removeRecord` of the same record cancels, and
//!   every surviving operation on that record between them is dropped too.
//! - `addToRelatedRecords` followed by the matching `removeFromRelatedRecords`
//!   cancels whether or not the pair is consecutive, but only while no
//!   operation between them writes the same relationship. This is narrower
//!   than cancelling every such pair: an intervening replace of the
//!   relationship would otherwise be left seeing a different member set.

use crate::operation::{OperationKind, RecordOperation};
use crate::{Record, Relationship};
use std::collections::BTreeSet;

/// Result of comparing an earlier operation with a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// Nothing merged; both survive.
    Keep,
    /// The earlier operation is superseded.
    DropEarlier,
    /// The later operation was folded into the earlier one.
    DropLater,
    /// The pair cancels out.
    DropBoth,
}

/// Coalesce a sequence of operations into a minimal equivalent sequence.
pub fn coalesce_record_operations(operations: Vec<RecordOperation>) -> Vec<RecordOperation> {
    let mut slots: Vec<Option<RecordOperation>> = operations.into_iter().map(Some).collect();

    for i in 0..slots.len() {
        let mut consecutive = true;
        let mut touched: BTreeSet<String> = BTreeSet::new();
        let mut kept_between: Vec<usize> = Vec::new();

        for j in (i + 1)..slots.len() {
            if slots[i].is_none() {
                break;
            }
            let (head, tail) = slots.split_at_mut(j);
            let (Some(earlier), Some(later)) = (head[i].as_mut(), tail[0].as_ref()) else {
                continue;
            };

            let same_record = earlier.record() == later.record();
            let later_removes_record = later.kind() == OperationKind::RemoveRecord;
            let outcome = merge(earlier, later, consecutive, &touched);

            match outcome {
                Merge::Keep => {
                    if same_record {
                        consecutive = false;
                        touched.extend(written_relationships(later));
                        kept_between.push(j);
                    }
                }
                Merge::DropLater => tail[0] = None,
                Merge::DropEarlier => {
                    head[i] = None;
                    break;
                }
                Merge::DropBoth => {
                    head[i] = None;
                    tail[0] = None;
                    // The record never exists, so nothing written to it survives.
                    if same_record && later_removes_record {
                        for k in kept_between.drain(..) {
                            head[k] = None;
                        }
                    }
                    break;
                }
            }
        }
    }

    slots.into_iter().flatten().collect()
}

fn merge(
    earlier: &mut RecordOperation,
    later: &RecordOperation,
    consecutive: bool,
    touched: &BTreeSet<String>,
) -> Merge {
    if earlier.record() != later.record() {
        return merge_across_records(earlier, later);
    }

    let earlier_kind = earlier.kind();
    let later_kind = later.kind();

    if later_kind == OperationKind::RemoveRecord {
        return if earlier_kind == OperationKind::AddRecord {
            Merge::DropBoth
        } else {
            Merge::DropEarlier
        };
    }

    if let (
        RecordOperation::AddToRelatedRecords {
            relationship: added_to,
            related_record: added,
            ..
        },
        RecordOperation::RemoveFromRelatedRecords {
            relationship: removed_from,
            related_record: removed,
            ..
        },
    ) = (&*earlier, later)
    {
        if added_to == removed_from && added == removed && !touched.contains(added_to) {
            return Merge::DropBoth;
        }
        return Merge::Keep;
    }

    if !consecutive && later_kind != OperationKind::ReplaceAttribute {
        return Merge::Keep;
    }

    if earlier_kind.is_replace_field() && later_kind.is_replace_field() {
        if writes_same_field(earlier, later) {
            return Merge::DropEarlier;
        }
        let mut payload = Record::new(earlier.record().clone());
        apply_field(&mut payload, earlier);
        apply_field(&mut payload, later);
        *earlier = RecordOperation::UpdateRecord { record: payload };
        return Merge::DropLater;
    }

    match (earlier, later) {
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            field,
        ) if later_kind.is_replace_field() => {
            apply_field(record, field);
            Merge::DropLater
        }
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            RecordOperation::UpdateRecord { record: update },
        ) => {
            record.merge(update);
            Merge::DropLater
        }
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            RecordOperation::AddToRelatedRecords {
                relationship,
                related_record,
                ..
            },
        ) => match record.relationships.get_mut(relationship) {
            Some(data) if data.is_many() => {
                data.add(related_record.clone());
                Merge::DropLater
            }
            _ => Merge::Keep,
        },
        (
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record },
            RecordOperation::RemoveFromRelatedRecords {
                relationship,
                related_record,
                ..
            },
        ) => match record.relationships.get_mut(relationship) {
            Some(data) if data.is_many() => {
                data.remove(related_record);
                Merge::DropLater
            }
            _ => Merge::Keep,
        },
        _ => Merge::Keep,
    }
}

/// A record removal makes an earlier to-one write pointing at it moot.
fn merge_across_records(earlier: &RecordOperation, later: &RecordOperation) -> Merge {
    match (earlier, later) {
        (
            RecordOperation::ReplaceRelatedRecord {
                related_record: Some(target),
                ..
            },
            RecordOperation::RemoveRecord { record: removed },
        ) if target == removed => Merge::DropEarlier,
        _ => Merge::Keep,
    }
}

fn writes_same_field(a: &RecordOperation, b: &RecordOperation) -> bool {
    match (a, b) {
        (
            RecordOperation::ReplaceAttribute { attribute: x, .. },
            RecordOperation::ReplaceAttribute { attribute: y, .. },
        )
        | (RecordOperation::ReplaceKey { key: x, .. }, RecordOperation::ReplaceKey { key: y, .. })
        | (
            RecordOperation::ReplaceRelatedRecord { relationship: x, .. },
            RecordOperation::ReplaceRelatedRecord { relationship: y, .. },
        )
        | (
            RecordOperation::ReplaceRelatedRecords { relationship: x, .. },
            RecordOperation::ReplaceRelatedRecords { relationship: y, .. },
        ) => x == y,
        _ => false,
    }
}

/// Write a field-replace operation into a record payload.
fn apply_field(record: &mut Record, operation: &RecordOperation) {
    match operation {
        RecordOperation::ReplaceAttribute {
            attribute, value, ..
        } => {
            record.attributes.insert(attribute.clone(), value.clone());
        }
        RecordOperation::ReplaceKey { key, value, .. } => {
            record.keys.insert(key.clone(), value.clone());
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
        _ => {}
    }
}

/// Relationship names an operation writes on its own record.
fn written_relationships(operation: &RecordOperation) -> Vec<String> {
    match operation {
        RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
            record.relationships.keys().cloned().collect()
        }
        _ => operation.relationship().map(str::to_string).into_iter().collect(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordIdentity;
    use serde_json::{Value, json};

    fn person(id: &str) -> RecordIdentity {
        RecordIdentity::new("person", id)
    }

    fn phone(id: &str) -> RecordIdentity {
        RecordIdentity::new("phoneNumber", id)
    }

    #[test]
    fn same_attribute_keeps_last_write() {
        let r = person("1");
        let ops = vec![
            RecordOperation::replace_attribute(r.clone(), "name", Value::Null),
            RecordOperation::replace_attribute(r.clone(), "name", "Jim"),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::replace_attribute(r, "name", "Jim")]
        );
    }

    #[test]
    fn add_record_absorbs_attribute() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(r.clone()).with_attribute("name", "Joe")),
            RecordOperation::replace_attribute(r.clone(), "name", "Jim"),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::add_record(
                Record::new(r).with_attribute("name", "Jim")
            )]
        );
    }

    #[test]
    fn add_then_remove_is_noop() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(r.clone())),
            RecordOperation::remove_record(r),
        ];
        assert!(coalesce_record_operations(ops).is_empty());
    }

    #[test]
    fn add_then_remove_drops_operations_between() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(phone("p"))),
            RecordOperation::add_record(Record::new(r.clone())),
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::replace_related_record(r.clone(), "employer", Some(RecordIdentity::new("company", "acme"))),
            RecordOperation::remove_record(r),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::add_record(Record::new(phone("p")))]
        );
    }

    #[test]
    fn remove_supersedes_update() {
        let r = person("1");
        let ops = vec![
            RecordOperation::replace_attribute(r.clone(), "name", "Jim"),
            RecordOperation::remove_record(r.clone()),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::remove_record(r)]
        );
    }

    #[test]
    fn add_then_remove_related_cancels() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::remove_from_related_records(r, "phoneNumbers", phone("p")),
        ];
        assert!(coalesce_record_operations(ops).is_empty());
    }

    #[test]
    fn add_then_remove_different_related_survives() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::remove_from_related_records(r, "phoneNumbers", phone("q")),
        ];
        assert_eq!(coalesce_record_operations(ops.clone()), ops);
    }

    #[test]
    fn different_fields_fold_into_update_record() {
        let r = person("1");
        let ops = vec![
            RecordOperation::replace_attribute(r.clone(), "name", "Jim"),
            RecordOperation::replace_related_record(r.clone(), "employer", Some(RecordIdentity::new("company", "acme"))),
        ];
        let expected = Record::new(r)
            .with_attribute("name", "Jim")
            .with_has_one("employer", Some(RecordIdentity::new("company", "acme")));
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::update_record(expected)]
        );
    }

    #[test]
    fn attribute_writes_merge_across_other_records() {
        let a = person("a");
        let b = person("b");
        let c = person("c");
        let ops = vec![
            RecordOperation::replace_attribute(c.clone(), "name", "one"),
            RecordOperation::replace_related_record(a.clone(), "manager", Some(b.clone())),
            RecordOperation::replace_related_record(b.clone(), "manager", Some(a.clone())),
            RecordOperation::replace_attribute(c.clone(), "name", "two"),
        ];
        let result = coalesce_record_operations(ops);
        assert_eq!(
            result,
            vec![
                RecordOperation::replace_related_record(a.clone(), "manager", Some(b.clone())),
                RecordOperation::replace_related_record(b, "manager", Some(a)),
                RecordOperation::replace_attribute(c, "name", "two"),
            ]
        );
    }

    #[test]
    fn relationship_write_does_not_jump_an_intervening_write() {
        let r = person("1");
        let ops = vec![
            RecordOperation::replace_related_record(r.clone(), "employer", Some(RecordIdentity::new("company", "a"))),
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::replace_related_record(r.clone(), "spouse", Some(person("2"))),
        ];
        assert_eq!(coalesce_record_operations(ops.clone()), ops);
    }

    #[test]
    fn attribute_write_jumps_an_intervening_write() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(r.clone()).with_attribute("name", "Joe")),
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::replace_attribute(r.clone(), "name", "Jim"),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![
                RecordOperation::add_record(Record::new(r.clone()).with_attribute("name", "Jim")),
                RecordOperation::add_to_related_records(r, "phoneNumbers", phone("p")),
            ]
        );
    }

    #[test]
    fn record_payload_absorbs_collection_ops_with_explicit_data() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(r.clone()).with_has_many("phoneNumbers", [phone("a")])),
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("b")),
            RecordOperation::remove_from_related_records(r.clone(), "phoneNumbers", phone("a")),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::add_record(
                Record::new(r).with_has_many("phoneNumbers", [phone("b")])
            )]
        );
    }

    #[test]
    fn record_payload_without_relationship_data_keeps_collection_op() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_record(Record::new(r.clone())),
            RecordOperation::add_to_related_records(r, "phoneNumbers", phone("b")),
        ];
        assert_eq!(coalesce_record_operations(ops.clone()), ops);
    }

    #[test]
    fn removal_drops_pointer_to_removed_record() {
        let r = person("1");
        let target = RecordIdentity::new("company", "acme");
        let ops = vec![
            RecordOperation::replace_related_record(r, "employer", Some(target.clone())),
            RecordOperation::remove_record(target.clone()),
        ];
        assert_eq!(
            coalesce_record_operations(ops),
            vec![RecordOperation::remove_record(target)]
        );
    }

    #[test]
    fn updates_merge_while_consecutive() {
        let r = person("1");
        let ops = vec![
            RecordOperation::update_record(Record::new(r.clone()).with_attribute("name", "Jim")),
            RecordOperation::update_record(Record::new(r.clone()).with_attribute("age", 40)),
        ];
        let merged = coalesce_record_operations(ops);
        assert_eq!(merged.len(), 1);
        assert!(matches!(
            &merged[0],
            RecordOperation::UpdateRecord { record }
                if record.attribute("name") == Some(&json!("Jim"))
                    && record.attribute("age") == Some(&json!(40))
        ));
    }

    #[test]
    fn cancel_blocked_by_intervening_replace_of_same_relationship() {
        let r = person("1");
        let ops = vec![
            RecordOperation::add_to_related_records(r.clone(), "phoneNumbers", phone("p")),
            RecordOperation::replace_related_records(r.clone(), "phoneNumbers", vec![phone("p")]),
            RecordOperation::remove_from_related_records(r, "phoneNumbers", phone("p")),
        ];
        assert_eq!(coalesce_record_operations(ops.clone()), ops);
    }

    #[test]
    fn empty_input() {
        assert!(coalesce_record_operations(Vec::new()).is_empty());
    }
}
