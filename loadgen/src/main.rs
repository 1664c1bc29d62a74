//! Command line entry point of the synthetic workload generator.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    loadgen::cli::execute()
}
