//! The lifecycle shared by all performance tests.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::CommandRunner;
use crate::dbench::DbenchTest;
use crate::error::PerfResult;
use crate::fio::FioTest;
use crate::latency::{LatencyTrace, LatencyTracing};
use crate::mount::Remount;
use crate::results::RunResults;
use crate::settings::Settings;
use crate::time::TimeTest;

/// Identity, command and behavioral flags of a single test.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TestSpec {
    /// Name of the test, also used to name its report files.
    pub name: String,
    /// Tool-specific command line fragment.
    pub command: String,
    /// Remount the filesystem between `setup` and the measured run.
    pub need_remount_after_setup: bool,
    /// Run against the directory as-is, without a fresh filesystem.
    pub skip_mkfs_and_mount: bool,
    /// The test ignores per-section options, so it only runs once per session.
    pub oneoff: bool,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }
}

/// Everything a test needs from its surroundings.
#[derive(Clone, Copy, Debug)]
pub struct TestEnv<'a> {
    /// Configuration lookup, most importantly `main.directory`.
    pub settings: &'a dyn Settings,
    /// Runs the benchmark tools.
    pub runner: &'a dyn CommandRunner,
    /// Where tools write their raw reports.
    pub results_dir: &'a Path,
}

/// Tool-specific steps of a performance test.
///
/// The order in which these are invoked is fixed by [`PerfTest`].
pub trait Benchmark: fmt::Debug {
    /// Prepares the test, e.g. by creating files that the measured run works on.
    fn setup(&mut self, _spec: &TestSpec, _env: &TestEnv<'_>, _section: &str) -> PerfResult<()> {
        Ok(())
    }

    /// Executes the benchmark tool.
    fn test(&mut self, spec: &TestSpec, env: &TestEnv<'_>) -> PerfResult<()>;

    /// Parses the output of [`test`](Self::test) and appends it to `run`.
    fn record_results(
        &self,
        spec: &TestSpec,
        env: &TestEnv<'_>,
        run: &mut RunResults,
    ) -> PerfResult<()>;

    /// Cleans up after the test.
    fn teardown(
        &mut self,
        _spec: &TestSpec,
        _env: &TestEnv<'_>,
        _run: &RunResults,
    ) -> PerfResult<()> {
        Ok(())
    }
}

/// A configured test: its [`TestSpec`] together with the [`Benchmark`] that executes it.
#[derive(Debug)]
pub struct PerfTest {
    spec: TestSpec,
    benchmark: Box<dyn Benchmark>,
    lat_trace: Option<LatencyTrace>,
}

impl PerfTest {
    pub fn new(spec: TestSpec, benchmark: impl Benchmark + 'static) -> Self {
        Self {
            spec,
            benchmark: Box::new(benchmark),
            lat_trace: None,
        }
    }

    /// A test running `fio` with the test's command as job description.
    pub fn fio(spec: TestSpec) -> Self {
        Self::new(spec, FioTest)
    }

    /// A test timing its command.
    pub fn time(spec: TestSpec) -> Self {
        Self::new(spec, TimeTest::default())
    }

    /// A test running `dbench` with the test's command as arguments.
    pub fn dbench(spec: TestSpec) -> Self {
        Self::new(spec, DbenchTest::default())
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The latency trace of the last [`run`](Self::run), even if that run failed.
    pub fn latency_trace(&self) -> Option<&LatencyTrace> {
        self.lat_trace.as_ref()
    }

    pub fn setup(&mut self, env: &TestEnv<'_>, section: &str) -> PerfResult<()> {
        self.benchmark.setup(&self.spec, env, section)
    }

    /// Remounts the filesystem if the test asks for it.
    pub fn maybe_cycle_mount(&self, mount: &mut dyn Remount) -> PerfResult<()> {
        if self.spec.need_remount_after_setup {
            mount.cycle_mount()?;
        }
        Ok(())
    }

    /// Runs the test under latency tracing and records its results into `run`.
    ///
    /// The latency trace is stored on this instance whether or not the test succeeds. Results are
    /// only recorded after a successful test.
    pub fn run(
        &mut self,
        run: &mut RunResults,
        env: &TestEnv<'_>,
        section: &str,
    ) -> PerfResult<()> {
        tracing::info!(test = %self.spec.name, section, "running test");

        let scope = LatencyTracing::start(env.settings, section)?;
        let result = self.benchmark.test(&self.spec, env);
        self.lat_trace = Some(scope.finish());
        result?;

        self.record_results(env, run)
    }

    /// Parses the output of the last run into `run` again.
    pub fn record_results(&self, env: &TestEnv<'_>, run: &mut RunResults) -> PerfResult<()> {
        self.benchmark.record_results(&self.spec, env, run)
    }

    pub fn teardown(&mut self, env: &TestEnv<'_>, run: &RunResults) -> PerfResult<()> {
        self.benchmark.teardown(&self.spec, env, run)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::command::fake::RecordingRunner;
    use crate::error::PerfError;
    use crate::results::TimeResult;

    use super::*;

    #[derive(Debug, Default)]
    struct Scripted {
        fail: bool,
        ran: bool,
    }

    impl Benchmark for Scripted {
        fn test(&mut self, spec: &TestSpec, _env: &TestEnv<'_>) -> PerfResult<()> {
            self.ran = true;
            if self.fail {
                return Err(PerfError::NoOutput {
                    name: spec.name.clone(),
                });
            }
            Ok(())
        }

        fn record_results(
            &self,
            _spec: &TestSpec,
            _env: &TestEnv<'_>,
            run: &mut RunResults,
        ) -> PerfResult<()> {
            assert!(self.ran, "recorded before test");
            run.time_results.push(TimeResult { elapsed: 1.0 });
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingMount(usize);

    impl Remount for CountingMount {
        fn cycle_mount(&mut self) -> PerfResult<()> {
            self.0 += 1;
            Ok(())
        }
    }

    fn env<'a>(
        settings: &'a BTreeMap<String, BTreeMap<String, String>>,
        runner: &'a RecordingRunner,
    ) -> TestEnv<'a> {
        TestEnv {
            settings,
            runner,
            results_dir: Path::new("results"),
        }
    }

    #[test]
    fn run_records_after_test() {
        let settings = BTreeMap::new();
        let runner = RecordingRunner::default();
        let mut test = PerfTest::new(TestSpec::new("scripted", ""), Scripted::default());
        let mut run = RunResults::new("scripted", "main", "test");

        test.run(&mut run, &env(&settings, &runner), "main").unwrap();

        assert_eq!(run.time_results, [TimeResult { elapsed: 1.0 }]);
        assert_eq!(test.latency_trace().unwrap().section, "main");
    }

    #[test]
    fn failed_test_keeps_trace_and_records_nothing() {
        let settings = BTreeMap::new();
        let runner = RecordingRunner::default();
        let benchmark = Scripted {
            fail: true,
            ..Default::default()
        };
        let mut test = PerfTest::new(TestSpec::new("scripted", ""), benchmark);
        let mut run = RunResults::new("scripted", "main", "test");

        let err = test.run(&mut run, &env(&settings, &runner), "main");

        assert!(matches!(err, Err(PerfError::NoOutput { .. })));
        assert!(test.latency_trace().is_some());
        assert!(run.is_empty());
    }

    #[test]
    fn remounts_only_when_requested() {
        let mut mount = CountingMount::default();

        let test = PerfTest::time(TestSpec::new("plain", "true"));
        test.maybe_cycle_mount(&mut mount).unwrap();
        assert_eq!(mount.0, 0);

        let mut spec = TestSpec::new("remount", "true");
        spec.need_remount_after_setup = true;
        let test = PerfTest::time(spec);
        test.maybe_cycle_mount(&mut mount).unwrap();
        assert_eq!(mount.0, 1);
    }
}
