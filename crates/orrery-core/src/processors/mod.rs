//! # Operation Processors
//!
//! Processors observe every operation a patch applies. Each one may reject
//! an operation up front, emit further operations around it, or maintain
//! derived state from the record change it produced.
//!
//! The cache runs a fixed, ordered list of processors chosen when it is
//! built. The default list is validation, integrity, consistency.

pub mod consistency;
pub mod integrity;
pub mod validation;

pub use consistency::SchemaConsistencyProcessor;
pub use integrity::IntegrityProcessor;
pub use validation::SchemaValidationProcessor;

use crate::relationship_index::RelationshipIndex;
use crate::store::{RecordAccessor, RecordChange};
use crate::{CacheSettings, OrreryError, RecordIdentity, RecordOperation, Schema};
use std::collections::BTreeSet;
use std::fmt;

/// State shared with processors while an operation is applied.
pub struct ProcessorContext<'a> {
    /// The cache schema.
    pub schema: &'a Schema,
    /// Read access to records and the relationship index.
    pub records: &'a dyn RecordAccessor,
    /// Records removed or scheduled for removal in the current patch.
    pub removed: &'a mut BTreeSet<RecordIdentity>,
}

impl fmt::Debug for ProcessorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("records", &self.records.record_count())
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}

/// A stage of the patch pipeline.
///
/// Every hook has a no-op default so a processor only implements the hooks
/// it needs. Operations returned from `before`, `after` and `finally` are
/// applied as corrections and pass through the whole pipeline again.
pub trait OperationProcessor: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Check a caller's operation before any operation of the batch runs.
    fn validate(&self, _schema: &Schema, _op: &RecordOperation) -> Result<(), OrreryError> {
        Ok(())
    }

    /// Operations to apply before `op`.
    fn before(
        &self,
        _ctx: &mut ProcessorContext<'_>,
        _op: &RecordOperation,
    ) -> Result<Vec<RecordOperation>, OrreryError> {
        Ok(Vec::new())
    }

    /// Operations to apply after `op`, computed from the state before it.
    fn after(
        &self,
        _ctx: &mut ProcessorContext<'_>,
        _op: &RecordOperation,
    ) -> Result<Vec<RecordOperation>, OrreryError> {
        Ok(Vec::new())
    }

    /// Maintain derived state right after the store write.
    fn immediate(&self, _index: &mut RelationshipIndex, _change: &RecordChange) {}

    /// Operations to apply once `op` and its `after` operations are done.
    fn finally(
        &self,
        _ctx: &mut ProcessorContext<'_>,
        _op: &RecordOperation,
    ) -> Result<Vec<RecordOperation>, OrreryError> {
        Ok(Vec::new())
    }
}

/// The default pipeline: validation, integrity, consistency.
///
/// Validation is left out when `settings.validate` is off.
#[must_use]
pub fn default_processors(settings: &CacheSettings) -> Vec<Box<dyn OperationProcessor>> {
    let mut processors: Vec<Box<dyn OperationProcessor>> = Vec::with_capacity(3);
    if settings.validate {
        processors.push(Box::new(SchemaValidationProcessor));
    }
    processors.push(Box::new(IntegrityProcessor));
    processors.push(Box::new(SchemaConsistencyProcessor));
    processors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(processors: &[Box<dyn OperationProcessor>]) -> Vec<&'static str> {
        processors.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn default_order() {
        let processors = default_processors(&CacheSettings::default());
        assert_eq!(names(&processors), vec!["validation", "integrity", "consistency"]);
    }

    #[test]
    fn validation_can_be_switched_off() {
        let settings = CacheSettings {
            validate: false,
            ..CacheSettings::default()
        };
        assert_eq!(names(&default_processors(&settings)), vec!["integrity", "consistency"]);
    }
}
