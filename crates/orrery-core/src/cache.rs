//! # Cache
//!
//! The orchestrator that owns the record store and runs every operation
//! through the processor pipeline.
//!
//! ## Patch Semantics
//!
//! A `patch` is all-or-nothing:
//! 1. The batch size is checked against `max_operations`.
//! 2. Every operation of the batch is validated before any is applied.
//! 3. Operations are applied in order. Each one runs `before`, the store
//!    write, `immediate`, the `after` corrections and `finally`, with
//!    corrections fed back through the same steps until none are emitted.
//!    Corrections go through a worklist, not recursion, so cascade length
//!    is limited only by `max_corrections`.
//! 4. Relationships written by the patch must name existing records.
//!
//! Any error in steps 3 or 4 restores records and index to their exact state
//! before the patch.

use crate::processors::{OperationProcessor, ProcessorContext, default_processors};
use crate::relationship_index::{InverseRelationship, RelationshipIndex};
use crate::store::{OperationOrigin, RecordAccessor, RecordStore};
use crate::{CacheSettings, OrreryError, Record, RecordIdentity, RecordOperation, Schema};
use std::collections::BTreeSet;

// =============================================================================
// CACHE
// =============================================================================

/// A schema-aware, in-memory record cache.
#[derive(Debug)]
pub struct Cache {
    schema: Schema,
    settings: CacheSettings,
    processors: Vec<Box<dyn OperationProcessor>>,
    store: RecordStore,
}

impl Cache {
    /// Create an empty cache with default settings.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self::with_settings(schema, CacheSettings::default())
    }

    /// Create an empty cache with the default pipeline for `settings`.
    #[must_use]
    pub fn with_settings(schema: Schema, settings: CacheSettings) -> Self {
        let processors = default_processors(&settings);
        Self::with_processors(schema, settings, processors)
    }

    /// Create an empty cache running an explicit processor list.
    #[must_use]
    pub fn with_processors(
        schema: Schema,
        settings: CacheSettings,
        processors: Vec<Box<dyn OperationProcessor>>,
    ) -> Self {
        Self {
            schema,
            settings,
            processors,
            store: RecordStore::new(),
        }
    }

    /// The schema this cache validates against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Names of the installed processors, in pipeline order.
    #[must_use]
    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// The relationship index.
    #[must_use]
    pub fn index(&self) -> &RelationshipIndex {
        self.store.index()
    }

    /// Iterate every record in identity order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.store.iter()
    }

    /// Drop every record and index entry.
    pub fn reset(&mut self) {
        tracing::debug!(records = self.store.record_count(), "cache reset");
        self.store.clear();
    }

    /// Apply a single operation. See `patch`.
    pub fn patch_one(&mut self, operation: RecordOperation) -> Result<Vec<RecordOperation>, OrreryError> {
        self.patch(vec![operation])
    }

    /// Apply a batch of operations atomically.
    ///
    /// Returns every operation actually applied: the caller's operations in
    /// order, each followed by the corrections it caused.
    pub fn patch(&mut self, operations: Vec<RecordOperation>) -> Result<Vec<RecordOperation>, OrreryError> {
        if operations.len() > self.settings.max_operations {
            return Err(OrreryError::PatchTooLarge {
                len: operations.len(),
                max: self.settings.max_operations,
            });
        }

        for operation in &operations {
            for processor in &self.processors {
                processor.validate(&self.schema, operation)?;
            }
        }

        let requested = operations.len();
        self.store.begin();
        let run = PatchRun {
            schema: &self.schema,
            settings: &self.settings,
            processors: &self.processors,
            store: &mut self.store,
            removed: BTreeSet::new(),
            touched: BTreeSet::new(),
            applied: Vec::new(),
            pending: Vec::new(),
            corrections: 0,
        };

        match run.execute(operations) {
            Ok(applied) => {
                self.store.commit();
                tracing::debug!(requested, applied = applied.len(), "patch applied");
                Ok(applied)
            }
            Err(err) => {
                self.store.rollback();
                tracing::warn!(requested, error = %err, "patch rolled back");
                Err(err)
            }
        }
    }
}

impl RecordAccessor for Cache {
    fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.store.get_record(identity)
    }

    fn get_inverse_relationships(&self, identity: &RecordIdentity) -> Vec<InverseRelationship> {
        self.store.get_inverse_relationships(identity)
    }

    fn records_of_type(&self, model: &str) -> Vec<&Record> {
        self.store.records_of_type(model)
    }

    fn record_count(&self) -> usize {
        self.store.record_count()
    }
}

// =============================================================================
// PATCH RUN
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Hook {
    Before,
    After,
    Finally,
}

/// One entry of the patch worklist.
#[derive(Debug)]
enum Step {
    /// Run `before`, then apply the operation.
    Begin(RecordOperation, OperationOrigin),
    /// Apply the operation and schedule its `after` corrections.
    Apply(RecordOperation, OperationOrigin),
    /// Run `finally` once every correction of the operation is done.
    Finish(RecordOperation),
}

/// State of one in-flight patch.
///
/// Corrections are processed depth-first from an explicit stack, so the
/// applied order is each operation followed by its corrections, and long
/// cascades cost heap rather than call stack.
struct PatchRun<'c> {
    schema: &'c Schema,
    settings: &'c CacheSettings,
    processors: &'c [Box<dyn OperationProcessor>],
    store: &'c mut RecordStore,
    /// Records removed or scheduled for removal.
    removed: BTreeSet<RecordIdentity>,
    /// Records written by the patch.
    touched: BTreeSet<RecordIdentity>,
    applied: Vec<RecordOperation>,
    /// Pending steps; the last one runs next.
    pending: Vec<Step>,
    /// Corrections scheduled so far.
    corrections: usize,
}

impl PatchRun<'_> {
    fn execute(mut self, operations: Vec<RecordOperation>) -> Result<Vec<RecordOperation>, OrreryError> {
        for operation in operations {
            self.pending.push(Step::Begin(operation, OperationOrigin::Caller));
            self.drain()?;
        }
        if self.settings.enforce_referential_integrity {
            self.check_references()?;
        }
        Ok(self.applied)
    }

    fn drain(&mut self) -> Result<(), OrreryError> {
        while let Some(step) = self.pending.pop() {
            match step {
                Step::Begin(operation, origin) => self.begin(operation, origin)?,
                Step::Apply(operation, origin) => self.apply(operation, origin)?,
                Step::Finish(operation) => {
                    let corrections = self.run_hook(Hook::Finally, &operation)?;
                    self.schedule(corrections)?;
                }
            }
        }
        Ok(())
    }

    fn begin(&mut self, operation: RecordOperation, origin: OperationOrigin) -> Result<(), OrreryError> {
        let identity = operation.record();
        if origin == OperationOrigin::Caller
            && matches!(operation, RecordOperation::RemoveRecord { .. })
            && self.removed.contains(identity)
            && !self.store.has_record(identity)
        {
            tracing::trace!(op = %operation, "already removed by cascade");
            return Ok(());
        }

        let corrections = self.run_hook(Hook::Before, &operation)?;
        self.pending.push(Step::Apply(operation, origin));
        self.schedule(corrections)
    }

    fn apply(&mut self, operation: RecordOperation, origin: OperationOrigin) -> Result<(), OrreryError> {
        let corrections = self.run_hook(Hook::After, &operation)?;

        let Some(change) = self.store.apply(&operation, origin)? else {
            tracing::trace!(op = %operation, "skipped correction on missing record");
            return Ok(());
        };
        for processor in self.processors {
            processor.immediate(self.store.index_mut(), &change);
        }
        if matches!(operation, RecordOperation::AddRecord { .. }) {
            self.removed.remove(&change.identity);
        }
        if origin == OperationOrigin::Caller || !change.is_noop() {
            tracing::trace!(op = %operation, "applied");
            self.touched.insert(change.identity.clone());
            self.applied.push(operation.clone());
        }

        self.pending.push(Step::Finish(operation));
        self.schedule(corrections)
    }

    /// Queue corrections to run next, in the order they were emitted.
    fn schedule(&mut self, corrections: Vec<RecordOperation>) -> Result<(), OrreryError> {
        self.corrections += corrections.len();
        if self.corrections > self.settings.max_corrections {
            return Err(OrreryError::Internal(format!(
                "patch exceeded {} corrections",
                self.settings.max_corrections
            )));
        }
        self.pending.extend(
            corrections
                .into_iter()
                .rev()
                .map(|correction| Step::Begin(correction, OperationOrigin::Correction)),
        );
        Ok(())
    }

    fn run_hook(&mut self, hook: Hook, operation: &RecordOperation) -> Result<Vec<RecordOperation>, OrreryError> {
        let processors = self.processors;
        let mut emitted = Vec::new();
        for processor in processors {
            let mut ctx = ProcessorContext {
                schema: self.schema,
                records: &*self.store,
                removed: &mut self.removed,
            };
            let ops = match hook {
                Hook::Before => processor.before(&mut ctx, operation),
                Hook::After => processor.after(&mut ctx, operation),
                Hook::Finally => processor.finally(&mut ctx, operation),
            }?;
            emitted.extend(ops);
        }
        Ok(emitted)
    }

    fn check_references(&self) -> Result<(), OrreryError> {
        for identity in &self.touched {
            let Some(record) = self.store.get_record(identity) else {
                continue;
            };
            for (name, data) in &record.relationships {
                if let Some(missing) = data.members().find(|member| !self.store.has_record(member)) {
                    return Err(OrreryError::DanglingReference {
                        record: identity.clone(),
                        relationship: name.clone(),
                        related_record: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelDefinition, RelationshipDefinition};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        let mut models = BTreeMap::new();
        models.insert(
            "planet".to_string(),
            ModelDefinition::new().attribute("name").relationship(
                "moons",
                RelationshipDefinition::has_many("moon").inverse("planet"),
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

    fn earth() -> RecordIdentity {
        RecordIdentity::new("planet", "earth")
    }

    fn luna() -> RecordIdentity {
        RecordIdentity::new("moon", "luna")
    }

    #[test]
    fn patch_returns_operation_then_corrections() {
        let mut cache = Cache::new(schema());
        let applied = cache
            .patch(vec![
                RecordOperation::add_record(Record::new(earth()).with_attribute("name", "Earth")),
                RecordOperation::add_record(
                    Record::new(luna()).with_has_one("planet", Some(earth())),
                ),
            ])
            .expect("patch");

        assert_eq!(applied.len(), 3);
        assert_eq!(
            applied[2],
            RecordOperation::add_to_related_records(earth(), "moons", luna())
        );
        assert_eq!(cache.related_records(&earth(), "moons"), vec![&luna()]);
    }

    #[test]
    fn patch_too_large_is_rejected_up_front() {
        let settings = CacheSettings {
            max_operations: 1,
            ..CacheSettings::default()
        };
        let mut cache = Cache::with_settings(schema(), settings);
        let result = cache.patch(vec![
            RecordOperation::add_record(Record::new(earth())),
            RecordOperation::add_record(Record::new(luna())),
        ]);
        assert!(matches!(result, Err(OrreryError::PatchTooLarge { len: 2, max: 1 })));
        assert_eq!(cache.record_count(), 0);
    }

    #[test]
    fn failure_rolls_back_whole_batch() {
        let mut cache = Cache::new(schema());
        cache
            .patch_one(RecordOperation::add_record(Record::new(earth()).with_attribute("name", "Earth")))
            .expect("seed");

        let result = cache.patch(vec![
            RecordOperation::replace_attribute(earth(), "name", "Terra"),
            RecordOperation::add_record(Record::new(luna()).with_has_one("planet", Some(earth()))),
            RecordOperation::remove_record(RecordIdentity::new("moon", "phobos")),
        ]);

        assert!(matches!(result, Err(OrreryError::RecordNotFound(_))));
        assert_eq!(cache.record_count(), 1);
        assert_eq!(
            cache.get_record(&earth()).and_then(|r| r.attribute("name")),
            Some(&json!("Earth"))
        );
        assert!(cache.related_records(&earth(), "moons").is_empty());
        assert!(cache.index().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut cache = Cache::new(schema());
        cache
            .patch(vec![
                RecordOperation::add_record(Record::new(earth())),
                RecordOperation::add_record(Record::new(luna()).with_has_one("planet", Some(earth()))),
            ])
            .expect("patch");
        cache.reset();
        assert_eq!(cache.record_count(), 0);
        assert!(cache.index().is_empty());
    }

    #[test]
    fn correction_limit_is_enforced() {
        let settings = CacheSettings {
            max_corrections: 0,
            ..CacheSettings::default()
        };
        let mut cache = Cache::with_settings(schema(), settings);
        cache
            .patch(vec![
                RecordOperation::add_record(Record::new(earth())),
                RecordOperation::add_record(Record::new(luna())),
            ])
            .expect("no corrections needed");

        let result = cache.patch_one(RecordOperation::add_to_related_records(earth(), "moons", luna()));
        assert!(matches!(result, Err(OrreryError::Internal(_))));
        assert!(cache.related_records(&earth(), "moons").is_empty());
    }
}
