//! # Cache Settings
//!
//! Runtime knobs for a `Cache`. Defaults come from `primitives`.
//!
//! Settings are usually read from the `[cache]` table of a TOML file:
//!
//! ```toml
//! [cache]
//! validate = true
//! enforce_referential_integrity = true
//! max_operations = 10000
//! max_corrections = 1000000
//! ```

use crate::OrreryError;
use crate::primitives::{MAX_PATCH_CORRECTIONS, MAX_PATCH_OPERATIONS};
use serde::{Deserialize, Serialize};

/// Behaviour switches and limits for a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Install the schema validation processor.
    pub validate: bool,
    /// Reject patches that leave a relationship pointing at a missing record.
    pub enforce_referential_integrity: bool,
    /// Largest accepted batch.
    pub max_operations: usize,
    /// Most corrective operations processed in one patch.
    pub max_corrections: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            validate: true,
            enforce_referential_integrity: true,
            max_operations: MAX_PATCH_OPERATIONS,
            max_corrections: MAX_PATCH_CORRECTIONS,
        }
    }
}

#[derive(Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    cache: CacheSettings,
}

impl CacheSettings {
    /// Read settings from the `[cache]` table of a TOML document.
    ///
    /// A document without the table yields the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, OrreryError> {
        let doc: SettingsDocument =
            toml::from_str(source).map_err(|e| OrreryError::Serialization(e.to_string()))?;
        Ok(doc.cache)
    }
}
