//! # orrery
//!
//! Replay and inspection CLI for the orrery record cache.
//!
//! ## Usage
//!
//! ```bash
//! # Summarise a schema
//! orrery --schema solar.json schema
//!
//! # Apply operations to a seed and print what was applied
//! orrery --schema solar.json patch -o ops.json --seed records.json
//!
//! # Show the coalesced form of an operations file
//! orrery coalesce -o ops.json
//!
//! # Show who points at a record after replaying operations
//! orrery --schema solar.json inverse -r planet:jupiter -o ops.json
//! ```

use clap::Parser;
use orrery::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // ORRERY_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ORRERY_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "orrery=debug,orrery_core=trace"
    } else {
        "orrery=info,orrery_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    match cli::execute(cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
