//! `commit-search` library: configuration, argument parsing and commands.
//!
//! The binary in `main.rs` only parses arguments, sets up logging and calls
//! [`run`].

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands};
pub use commands::run;
pub use config::{AppConfig, CacheBackend};

use tracing_subscriber::EnvFilter;

/// Default log filter when neither `--log-level` nor `RUST_LOG` is set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Install a stderr `tracing` subscriber.
///
/// `level` wins over `RUST_LOG`. Stdout is left for command output.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
