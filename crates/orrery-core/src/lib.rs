//! # orrery-core
//!
//! The consistency core of a schema-aware graph record cache.
//!
//! Records are typed, identified entities joined by to-one and to-many
//! relationships. They change only through `RecordOperation`s applied by
//! `Cache::patch`, which keeps both sides of every inverse relationship in
//! agreement, cascades dependent removals, validates against a `Schema`
//! and maintains a reverse relationship index.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and single-writer: a patch runs to completion before
//!   returning, and callers serialize concurrent patches themselves.
//! - Deterministic: `BTreeMap`/`BTreeSet` everywhere, so the same patch on
//!   the same state always yields the same applied operations.
//! - All-or-nothing: a failed patch leaves no trace.
//! - NO async, NO I/O, NO persistence.

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod operation;
pub mod primitives;
pub mod processors;
pub mod relationship_index;
pub mod schema;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    OrreryError, Record, RecordIdentity, Relationship, ValidationError, ValidationIssue,
    ValidationIssueKind,
};

// =============================================================================
// RE-EXPORTS: Operations and Schema
// =============================================================================

pub use coalesce::coalesce_record_operations;
pub use operation::{OperationKind, RecordOperation};
pub use schema::{
    AttributeDefinition, AttributeType, DependentAction, KeyDefinition, ModelDefinition,
    RelatedType, RelationshipDefinition, RelationshipKind, Schema,
};

// =============================================================================
// RE-EXPORTS: Cache
// =============================================================================

pub use cache::Cache;
pub use config::CacheSettings;
pub use processors::{
    IntegrityProcessor, OperationProcessor, ProcessorContext, SchemaConsistencyProcessor,
    SchemaValidationProcessor, default_processors,
};
pub use relationship_index::{InverseRelationship, RelationshipIndex};
pub use store::{OperationOrigin, RecordAccessor, RecordChange, RecordStore};
