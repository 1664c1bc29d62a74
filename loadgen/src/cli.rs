//! Command line interface of the `loadgen` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::config::Config;
use crate::{log, metrics, observability};

/// Synthetic workload generator simulating concurrent user sessions.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,

    /// path of the merged activity log (default: workload.log)
    #[argh(option, short = 'o', default = "PathBuf::from(\"workload.log\")")]
    output: PathBuf,

    /// seed for a reproducible run, overriding the configuration
    #[argh(option)]
    seed: Option<u64>,

    /// do not print the summary after the run
    #[argh(switch, short = 'q')]
    quiet: bool,
}

/// Bootstrap the runtime and run the configured workload.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(&args.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("loadgen-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing();
    tracing::debug!(?config);

    let mut builder = config.into_builder();
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let workload = builder.build().context("invalid workload configuration")?;

    let report = runtime.block_on(workload.run());

    log::write_log(&args.output, &report.entries)
        .with_context(|| format!("failed to write log to {}", args.output.display()))?;
    tracing::info!(
        path = %args.output.display(),
        entries = report.entries.len(),
        "activity log written"
    );

    if !args.quiet {
        metrics::print_report(&report, workload.seed());
    }

    Ok(())
}
