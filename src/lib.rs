//! Classification and relocation planning library (see `orchestrator` for
//! the top-level pipeline and `src/bin/cli.rs` for the command-line shell).

pub mod catalog;
pub mod categories;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod path_synth;
pub mod resolver;
pub mod rules;

use tracing_subscriber::EnvFilter;

/// Initializes `tracing` with an `RUST_LOG`-driven filter, defaulting to
/// `warn` for dependencies and `info` for this crate's own spans.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,relocate=info")))
        .init();
}
