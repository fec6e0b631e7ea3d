//! # Schema Consistency
//!
//! Keeps both sides of every inverse relationship in agreement and carries
//! out dependent removals.
//!
//! Corrections are computed in the `after` hook against the state before the
//! operation is applied, so removals can be derived from the previous
//! relationship data rather than only additions. A correction is emitted only
//! when the other side does not already hold the desired state, which makes
//! the pipeline reach a fixed point.
//!
//! ## Removal
//!
//! Removing a record R:
//! 1. marks R as removed for the rest of the patch,
//! 2. schedules `removeRecord` for every record related through a
//!    `dependent: remove` relationship that is not already scheduled,
//! 3. detaches R from every record that still references it, using the
//!    relationship index to find them.
//!
//! Records already scheduled for removal are never corrected, which keeps
//! cascades over cyclic relationship graphs finite.

use super::{OperationProcessor, ProcessorContext};
use crate::schema::RelationshipKind;
use crate::{OrreryError, RecordIdentity, RecordOperation, Relationship};
use std::collections::BTreeSet;

/// Emits inverse-relationship and dependent-removal corrections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaConsistencyProcessor;

impl OperationProcessor for SchemaConsistencyProcessor {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn after(
        &self,
        ctx: &mut ProcessorContext<'_>,
        op: &RecordOperation,
    ) -> Result<Vec<RecordOperation>, OrreryError> {
        let mut corrections = Vec::new();
        let record = op.record();

        match op {
            RecordOperation::RemoveRecord { .. } => {
                removal_corrections(ctx, record, &mut corrections);
            }
            RecordOperation::AddRecord { record: payload }
            | RecordOperation::UpdateRecord { record: payload } => {
                for (name, data) in &payload.relationships {
                    let previous = current_members(ctx, record, name);
                    inverse_corrections(
                        ctx,
                        record,
                        name,
                        &previous,
                        &data.member_set(),
                        &mut corrections,
                    )?;
                }
            }
            RecordOperation::AddToRelatedRecords {
                relationship,
                related_record,
                ..
            } => {
                let previous = current_members(ctx, record, relationship);
                let mut next = previous.clone();
                next.insert(related_record.clone());
                inverse_corrections(ctx, record, relationship, &previous, &next, &mut corrections)?;
            }
            RecordOperation::RemoveFromRelatedRecords {
                relationship,
                related_record,
                ..
            } => {
                let previous = current_members(ctx, record, relationship);
                let mut next = previous.clone();
                next.remove(related_record);
                inverse_corrections(ctx, record, relationship, &previous, &next, &mut corrections)?;
            }
            RecordOperation::ReplaceRelatedRecords {
                relationship,
                related_records,
                ..
            } => {
                let previous = current_members(ctx, record, relationship);
                let next = related_records.iter().cloned().collect();
                inverse_corrections(ctx, record, relationship, &previous, &next, &mut corrections)?;
            }
            RecordOperation::ReplaceRelatedRecord {
                relationship,
                related_record,
                ..
            } => {
                let previous = current_members(ctx, record, relationship);
                let next = related_record.iter().cloned().collect();
                inverse_corrections(ctx, record, relationship, &previous, &next, &mut corrections)?;
            }
            RecordOperation::ReplaceKey { .. } | RecordOperation::ReplaceAttribute { .. } => {}
        }

        for correction in &corrections {
            tracing::trace!(cause = %op, correction = %correction, "consistency correction");
        }
        Ok(corrections)
    }
}

/// Members of `record.relationship` as currently stored.
fn current_members(
    ctx: &ProcessorContext<'_>,
    record: &RecordIdentity,
    relationship: &str,
) -> BTreeSet<RecordIdentity> {
    ctx.records
        .relationship_of(record, relationship)
        .map(Relationship::member_set)
        .unwrap_or_default()
}

/// Corrections that bring the inverse side of `record.relationship` in line
/// with a change of its members from `previous` to `next`.
fn inverse_corrections(
    ctx: &ProcessorContext<'_>,
    record: &RecordIdentity,
    relationship: &str,
    previous: &BTreeSet<RecordIdentity>,
    next: &BTreeSet<RecordIdentity>,
    out: &mut Vec<RecordOperation>,
) -> Result<(), OrreryError> {
    let Ok(definition) = ctx.schema.relationship(&record.model, relationship) else {
        return Ok(());
    };
    let Some(inverse) = definition.inverse.as_deref() else {
        return Ok(());
    };

    for detached in previous.difference(next) {
        if ctx.removed.contains(detached) {
            continue;
        }
        let Some(related) = ctx.records.get_record(detached) else {
            continue;
        };
        match related.relationship(inverse) {
            Some(Relationship::HasMany(members)) if members.contains(record) => {
                out.push(RecordOperation::remove_from_related_records(
                    detached.clone(),
                    inverse,
                    record.clone(),
                ));
            }
            Some(Relationship::HasOne(Some(current))) if current == record => {
                out.push(RecordOperation::replace_related_record(
                    detached.clone(),
                    inverse,
                    None,
                ));
            }
            _ => {}
        }
    }

    for attached in next.difference(previous) {
        if ctx.removed.contains(attached) {
            continue;
        }
        let inverse_kind = ctx
            .schema
            .relationship(&attached.model, inverse)
            .map(|def| def.kind)
            .map_err(|err| {
                OrreryError::Internal(format!(
                    "inverse of {}.{relationship} unresolved for {attached}: {err}",
                    record.model
                ))
            })?;
        let existing = ctx.records.relationship_of(attached, inverse);
        match inverse_kind {
            RelationshipKind::HasMany => {
                if !existing.is_some_and(|data| data.contains(record)) {
                    out.push(RecordOperation::add_to_related_records(
                        attached.clone(),
                        inverse,
                        record.clone(),
                    ));
                }
            }
            RelationshipKind::HasOne => {
                if existing != Some(&Relationship::HasOne(Some(record.clone()))) {
                    out.push(RecordOperation::replace_related_record(
                        attached.clone(),
                        inverse,
                        Some(record.clone()),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Dependent removals and detachments for removing `record`.
fn removal_corrections(
    ctx: &mut ProcessorContext<'_>,
    record: &RecordIdentity,
    out: &mut Vec<RecordOperation>,
) {
    let records = ctx.records;
    ctx.removed.insert(record.clone());
    let Some(existing) = records.get_record(record) else {
        return;
    };

    for (name, data) in &existing.relationships {
        let cascades = ctx
            .schema
            .relationship(&record.model, name)
            .is_ok_and(|def| def.removes_dependents());
        if !cascades {
            continue;
        }
        for dependent in data.members() {
            if dependent == record || !records.has_record(dependent) {
                continue;
            }
            if ctx.removed.insert(dependent.clone()) {
                out.push(RecordOperation::remove_record(dependent.clone()));
            }
        }
    }

    for entry in records.get_inverse_relationships(record) {
        if entry.record == *record || ctx.removed.contains(&entry.record) {
            continue;
        }
        match records.relationship_of(&entry.record, &entry.relationship) {
            Some(Relationship::HasMany(_)) => {
                out.push(RecordOperation::remove_from_related_records(
                    entry.record,
                    entry.relationship,
                    record.clone(),
                ));
            }
            Some(Relationship::HasOne(_)) => {
                out.push(RecordOperation::replace_related_record(
                    entry.record,
                    entry.relationship,
                    None,
                ));
            }
            None => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelDefinition, RelationshipDefinition};
    use crate::store::{OperationOrigin, RecordStore};
    use crate::{Record, Schema};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        let mut models = BTreeMap::new();
        models.insert(
            "planet".to_string(),
            ModelDefinition::new().attribute("name").relationship(
                "moons",
                RelationshipDefinition::has_many("moon")
                    .inverse("planet")
                    .dependent_remove(),
            ),
        );
        models.insert(
            "moon".to_string(),
            ModelDefinition::new()
                .attribute("name")
                .relationship("planet", RelationshipDefinition::has_one("planet").inverse("moons")),
        );
        Schema::new(models).expect("schema")
    }

    fn planet(id: &str) -> RecordIdentity {
        RecordIdentity::new("planet", id)
    }

    fn moon(id: &str) -> RecordIdentity {
        RecordIdentity::new("moon", id)
    }

    fn store_with(records: Vec<Record>) -> RecordStore {
        let mut store = RecordStore::new();
        for record in records {
            let change = store
                .apply(&RecordOperation::add_record(record), OperationOrigin::Caller)
                .expect("seed")
                .expect("change");
            store
                .index_mut()
                .apply_change(change.previous.as_ref(), change.current.as_ref());
        }
        store
    }

    fn corrections(store: &RecordStore, op: &RecordOperation) -> Vec<RecordOperation> {
        let schema = schema();
        let mut removed = BTreeSet::new();
        let mut ctx = ProcessorContext {
            schema: &schema,
            records: store,
            removed: &mut removed,
        };
        SchemaConsistencyProcessor.after(&mut ctx, op).expect("after")
    }

    #[test]
    fn add_to_has_many_sets_inverse_has_one() {
        let store = store_with(vec![Record::new(planet("saturn")), Record::new(moon("titan"))]);
        let op = RecordOperation::add_to_related_records(planet("saturn"), "moons", moon("titan"));
        assert_eq!(
            corrections(&store, &op),
            vec![RecordOperation::replace_related_record(
                moon("titan"),
                "planet",
                Some(planet("saturn"))
            )]
        );
    }

    #[test]
    fn no_correction_when_inverse_already_holds() {
        let store = store_with(vec![
            Record::new(planet("saturn")),
            Record::new(moon("titan")).with_has_one("planet", Some(planet("saturn"))),
        ]);
        let op = RecordOperation::add_to_related_records(planet("saturn"), "moons", moon("titan"));
        assert!(corrections(&store, &op).is_empty());
    }

    #[test]
    fn replacing_has_one_moves_membership() {
        let store = store_with(vec![
            Record::new(planet("jupiter")).with_has_many("moons", [moon("io")]),
            Record::new(planet("saturn")),
            Record::new(moon("io")).with_has_one("planet", Some(planet("jupiter"))),
        ]);
        let op = RecordOperation::replace_related_record(moon("io"), "planet", Some(planet("saturn")));
        assert_eq!(
            corrections(&store, &op),
            vec![
                RecordOperation::remove_from_related_records(planet("jupiter"), "moons", moon("io")),
                RecordOperation::add_to_related_records(planet("saturn"), "moons", moon("io")),
            ]
        );
    }

    #[test]
    fn collection_replace_diffs_members() {
        let store = store_with(vec![
            Record::new(planet("jupiter")).with_has_many("moons", [moon("io")]),
            Record::new(moon("io")).with_has_one("planet", Some(planet("jupiter"))),
            Record::new(moon("europa")),
        ]);
        let op = RecordOperation::replace_related_records(planet("jupiter"), "moons", vec![moon("europa")]);
        assert_eq!(
            corrections(&store, &op),
            vec![
                RecordOperation::replace_related_record(moon("io"), "planet", None),
                RecordOperation::replace_related_record(moon("europa"), "planet", Some(planet("jupiter"))),
            ]
        );
    }

    #[test]
    fn removal_schedules_dependents_once() {
        let store = store_with(vec![
            Record::new(planet("jupiter")).with_has_many("moons", [moon("io"), moon("europa")]),
            Record::new(moon("io")).with_has_one("planet", Some(planet("jupiter"))),
            Record::new(moon("europa")).with_has_one("planet", Some(planet("jupiter"))),
        ]);
        let ops = corrections(&store, &RecordOperation::remove_record(planet("jupiter")));
        assert_eq!(
            ops,
            vec![
                RecordOperation::remove_record(moon("io")),
                RecordOperation::remove_record(moon("europa")),
            ]
        );
    }

    #[test]
    fn removal_detaches_referencing_records() {
        let store = store_with(vec![
            Record::new(planet("jupiter")).with_has_many("moons", [moon("io")]),
            Record::new(moon("io")).with_has_one("planet", Some(planet("jupiter"))),
        ]);
        let ops = corrections(&store, &RecordOperation::remove_record(moon("io")));
        assert_eq!(
            ops,
            vec![RecordOperation::remove_from_related_records(
                planet("jupiter"),
                "moons",
                moon("io")
            )]
        );
    }
}
