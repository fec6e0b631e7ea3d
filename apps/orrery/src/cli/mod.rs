//! # orrery CLI Module
//!
//! This module implements the CLI interface for orrery.
//!
//! ## Available Commands
//!
//! - `schema` - Load a schema and summarise its models
//! - `patch` - Apply an operations file and print the applied operations
//! - `coalesce` - Print the coalesced form of an operations file
//! - `inverse` - Print the records pointing at one record

mod commands;

use clap::{Parser, Subcommand};
use orrery_core::OrreryError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// orrery - schema-aware record cache
///
/// Replays record operations through the cache core and reports the
/// corrections it derives for inverse relationships and dependent removals.
#[derive(Parser, Debug)]
#[command(name = "orrery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only the result, without a summary line
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the schema document (JSON, or TOML by extension)
    #[arg(short = 'S', long, global = true, default_value = "schema.json")]
    pub schema: PathBuf,

    /// Optional TOML file with a `[cache]` settings table
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a schema and summarise its models
    Schema,

    /// Apply an operations file and print the applied operations
    Patch {
        /// Path to a JSON array of operations
        #[arg(short, long)]
        operations: PathBuf,

        /// Path to a JSON array of records loaded before the operations
        #[arg(short, long)]
        seed: Option<PathBuf>,

        /// Coalesce the operations before applying them
        #[arg(long)]
        coalesce: bool,
    },

    /// Print the coalesced form of an operations file
    Coalesce {
        /// Path to a JSON array of operations
        #[arg(short, long)]
        operations: PathBuf,
    },

    /// Print the records pointing at one record
    Inverse {
        /// Record identity as `type:id`
        #[arg(short, long)]
        record: String,

        /// Path to a JSON array of operations applied first
        #[arg(short, long)]
        operations: Option<PathBuf>,

        /// Path to a JSON array of records loaded before the operations
        #[arg(short, long)]
        seed: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments, returning the text to print.
pub fn execute(cli: Cli) -> Result<String, OrreryError> {
    let options = OutputOptions {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
    };

    match cli.command {
        Some(Commands::Schema) | None => cmd_schema(&cli.schema, options),
        Some(Commands::Patch {
            operations,
            seed,
            coalesce,
        }) => cmd_patch(
            &cli.schema,
            cli.config.as_deref(),
            &operations,
            seed.as_deref(),
            coalesce,
            options,
        ),
        Some(Commands::Coalesce { operations }) => cmd_coalesce(&operations, options),
        Some(Commands::Inverse {
            record,
            operations,
            seed,
        }) => cmd_inverse(
            &cli.schema,
            cli.config.as_deref(),
            &record,
            operations.as_deref(),
            seed.as_deref(),
            options,
        ),
    }
}
