//! Logging setup for the `loadgen` binary.

use std::env;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs a global `tracing` subscriber that logs to stderr.
///
/// The verbosity is controlled through `RUST_LOG`, see [`parse_rust_log`].
pub fn init_tracing() {
    let (level, env_filter) = parse_rust_log(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Interprets the value of `RUST_LOG`.
///
/// A plain level such as `debug` applies to this crate, while dependencies stay at `INFO`. Any
/// other value is used literally as filter directive. Without a value, the level is `INFO`.
pub fn parse_rust_log(value: Option<&str>) -> (Level, EnvFilter) {
    let level = match value {
        Some(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        None => Level::INFO,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new("INFO,loadgen=TRACE");

    (level, env_filter)
}
