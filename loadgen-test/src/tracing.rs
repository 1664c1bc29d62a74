use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVES: &str = "ERROR,loadgen=TRACE";

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, so output only shows up for failing
/// tests. `RUST_LOG` replaces the default directives, which capture everything from `loadgen`.
/// Calling this more than once is harmless.
///
/// # Example
///
/// ```
/// loadgen_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new(DEFAULT_DIRECTIVES),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}
