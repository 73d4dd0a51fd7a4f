//! Runs filesystem benchmarks (`fio`, `dbench` and timed commands) and reports their results.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    fsperf_cli::cli::execute()
}
