//! # CLI Command Implementations
//!
//! Each command loads its documents, runs them through a fresh `Cache` and
//! renders the result as text or JSON. Commands return the rendered output
//! instead of printing it.

use orrery_core::{
    Cache, CacheSettings, OrreryError, Record, RecordAccessor, RecordIdentity, RecordOperation,
    RelationshipKind, Schema, coalesce_record_operations,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of any input document (64 MB).
const MAX_INPUT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json_mode: bool,
    pub quiet: bool,
}

/// Validate the path and size of an input file, then read it.
fn read_document(path: &Path) -> Result<String, OrreryError> {
    let canonical = validate_file_path(path)?;

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| OrreryError::Io(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(OrreryError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }

    std::fs::read_to_string(&canonical)
        .map_err(|e| OrreryError::Io(format!("Read '{}': {}", path.display(), e)))
}

/// Resolve symlinks and `..`, and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, OrreryError> {
    let canonical = path.canonicalize().map_err(|e| {
        OrreryError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(OrreryError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, OrreryError> {
    serde_json::to_string_pretty(value).map_err(OrreryError::from)
}

// =============================================================================
// LOADERS
// =============================================================================

/// Load a schema; `.toml` files are read as TOML, anything else as JSON.
pub fn load_schema(path: &Path) -> Result<Schema, OrreryError> {
    let source = read_document(path)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        Schema::from_toml_str(&source)
    } else {
        Schema::from_json_str(&source)
    }
}

/// Load cache settings, falling back to defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<CacheSettings, OrreryError> {
    match path {
        Some(path) => CacheSettings::from_toml_str(&read_document(path)?),
        None => Ok(CacheSettings::default()),
    }
}

/// Load a JSON array of operations.
pub fn load_operations(path: &Path) -> Result<Vec<RecordOperation>, OrreryError> {
    Ok(serde_json::from_str(&read_document(path)?)?)
}

/// Build a cache and load the seed records into it, if any.
///
/// The seed goes through `patch` like everything else, so inverse
/// relationships a seed only declares on one side are filled in.
pub fn load_cache(
    schema: Schema,
    settings: CacheSettings,
    seed: Option<&Path>,
) -> Result<Cache, OrreryError> {
    let mut cache = Cache::with_settings(schema, settings);

    if let Some(seed) = seed {
        let records: Vec<Record> = serde_json::from_str(&read_document(seed)?)?;
        let count = records.len();
        cache.patch(records.into_iter().map(RecordOperation::add_record).collect())?;
        tracing::info!(records = count, "seed loaded");
    }

    Ok(cache)
}

/// Parse a `type:id` record identity.
pub fn parse_identity(source: &str) -> Result<RecordIdentity, OrreryError> {
    match source.split_once(':') {
        Some((model, id)) if !model.is_empty() && !id.is_empty() => {
            Ok(RecordIdentity::new(model, id))
        }
        _ => Err(OrreryError::Serialization(format!(
            "Invalid record identity '{}': expected type:id",
            source
        ))),
    }
}

// =============================================================================
// SCHEMA COMMAND
// =============================================================================

/// Load a schema and summarise its models.
pub fn cmd_schema(schema_path: &Path, options: OutputOptions) -> Result<String, OrreryError> {
    let schema = load_schema(schema_path)?;

    if options.json_mode {
        return to_json(&schema);
    }

    let mut lines = Vec::new();
    if !options.quiet {
        lines.push(format!(
            "Schema v{} ({} models)",
            schema.version(),
            schema.model_names().count()
        ));
    }

    for name in schema.model_names() {
        let model = schema.model(name)?;
        lines.push(format!(
            "{}: {} attribute(s), {} key(s), {} relationship(s)",
            name,
            model.attributes.len(),
            model.keys.len(),
            model.relationships.len()
        ));

        for (relationship, definition) in &model.relationships {
            let kind = match definition.kind {
                RelationshipKind::HasOne => "hasOne",
                RelationshipKind::HasMany => "hasMany",
            };
            let mut line = format!(
                "  {} -> {} {}",
                relationship,
                kind,
                definition.related_type.models().join("|")
            );
            if let Some(inverse) = &definition.inverse {
                line.push_str(&format!(" (inverse: {})", inverse));
            }
            if definition.removes_dependents() {
                line.push_str(" [dependent: remove]");
            }
            lines.push(line);
        }
    }

    Ok(lines.join("\n"))
}

// =============================================================================
// PATCH COMMAND
// =============================================================================

#[derive(Serialize)]
struct PatchOutput<'a> {
    applied: &'a [RecordOperation],
    records: Vec<&'a Record>,
}

/// Apply an operations file and report the applied operations.
pub fn cmd_patch(
    schema_path: &Path,
    config: Option<&Path>,
    operations_path: &Path,
    seed: Option<&Path>,
    coalesce: bool,
    options: OutputOptions,
) -> Result<String, OrreryError> {
    let schema = load_schema(schema_path)?;
    let settings = load_settings(config)?;
    let mut cache = load_cache(schema, settings, seed)?;

    let mut operations = load_operations(operations_path)?;
    if coalesce {
        let before = operations.len();
        operations = coalesce_record_operations(operations);
        tracing::info!(before, after = operations.len(), "operations coalesced");
    }

    let applied = cache.patch(operations)?;

    if options.json_mode {
        return to_json(&PatchOutput {
            applied: &applied,
            records: cache.records().collect(),
        });
    }

    let mut lines: Vec<String> = applied.iter().map(ToString::to_string).collect();
    if !options.quiet {
        lines.push(format!(
            "{} operation(s) applied, {} record(s) in cache",
            applied.len(),
            cache.record_count()
        ));
    }
    Ok(lines.join("\n"))
}

// =============================================================================
// COALESCE COMMAND
// =============================================================================

/// Print the coalesced form of an operations file.
pub fn cmd_coalesce(operations_path: &Path, options: OutputOptions) -> Result<String, OrreryError> {
    let operations = load_operations(operations_path)?;
    let before = operations.len();
    let coalesced = coalesce_record_operations(operations);

    if options.json_mode {
        return to_json(&coalesced);
    }

    let mut lines: Vec<String> = coalesced.iter().map(ToString::to_string).collect();
    if !options.quiet {
        lines.push(format!(
            "{} operation(s) coalesced to {}",
            before,
            coalesced.len()
        ));
    }
    Ok(lines.join("\n"))
}

// =============================================================================
// INVERSE COMMAND
// =============================================================================

/// Print every record that points at `record`.
pub fn cmd_inverse(
    schema_path: &Path,
    config: Option<&Path>,
    record: &str,
    operations_path: Option<&Path>,
    seed: Option<&Path>,
    options: OutputOptions,
) -> Result<String, OrreryError> {
    let identity = parse_identity(record)?;
    let schema = load_schema(schema_path)?;
    schema.model(&identity.model)?;

    let settings = load_settings(config)?;
    let mut cache = load_cache(schema, settings, seed)?;
    if let Some(path) = operations_path {
        cache.patch(load_operations(path)?)?;
    }

    let inverse = cache.get_inverse_relationships(&identity);

    if options.json_mode {
        return to_json(&inverse);
    }

    let mut lines: Vec<String> = inverse
        .iter()
        .map(|entry| format!("{}.{}", entry.record, entry.relationship))
        .collect();
    if !options.quiet {
        lines.push(format!("{} record(s) point at {}", inverse.len(), identity));
    }
    Ok(lines.join("\n"))
}
