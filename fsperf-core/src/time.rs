use std::time::Instant;

use crate::error::{PerfError, PerfResult};
use crate::lifecycle::{Benchmark, TestEnv, TestSpec};
use crate::results::{RunResults, TimeResult};

/// Token in the command that is replaced by the benchmark directory.
pub const DIRECTORY_PLACEHOLDER: &str = "DIRECTORY";

/// Measures the wall-clock time of an arbitrary command.
#[derive(Clone, Debug, Default)]
pub struct TimeTest {
    elapsed: Option<f64>,
}

impl TimeTest {
    /// Seconds the last run took.
    pub fn elapsed(&self) -> Option<f64> {
        self.elapsed
    }
}

impl Benchmark for TimeTest {
    fn test(&mut self, spec: &TestSpec, env: &TestEnv<'_>) -> PerfResult<()> {
        let directory = env.settings.directory()?;
        let command = spec.command.replace(DIRECTORY_PLACEHOLDER, directory);

        let start = Instant::now();
        env.runner.run(&command, None)?;
        self.elapsed = Some(start.elapsed().as_secs_f64());

        Ok(())
    }

    fn record_results(
        &self,
        spec: &TestSpec,
        _env: &TestEnv<'_>,
        run: &mut RunResults,
    ) -> PerfResult<()> {
        let elapsed = self.elapsed.ok_or_else(|| PerfError::NoOutput {
            name: spec.name.clone(),
        })?;
        run.time_results.push(TimeResult { elapsed });
        Ok(())
    }
}
