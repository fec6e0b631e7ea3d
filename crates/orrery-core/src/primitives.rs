//! # Cache Primitives
//!
//! Compiled-in limits for the orrery cache core.
//!
//! Every limit here has a runtime counterpart in `CacheSettings`; these are
//! the defaults used when no configuration overrides them.

/// Default maximum number of operations accepted in one patch.
///
/// Patches longer than this are rejected with `PatchTooLarge` before any
/// validation or mutation takes place.
pub const MAX_PATCH_OPERATIONS: usize = 10_000;

/// Default maximum number of corrective operations processed in one patch.
///
/// Corrections are drained from a worklist, so cascade length is bounded by
/// this count and never by the call stack. Every cascade terminates on its
/// own; reaching the limit means a processor keeps emitting corrections and
/// fails the patch with `Internal`.
pub const MAX_PATCH_CORRECTIONS: usize = 1_000_000;

/// Current schema format version written by `Schema::new`.
pub const SCHEMA_VERSION: u32 = 1;
