//! Tests driven by [fio](https://fio.readthedocs.io), parsed from its JSON report.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PerfError, PerfResult};
use crate::lifecycle::{Benchmark, TestEnv, TestSpec};
use crate::results::{FioResult, RunResults};

/// Flags that make fio runs comparable with each other.
const FIXED_FLAGS: &str = "--alloc-size 98304 --allrandrepeat=1 --randseed=12345";

#[derive(Debug, Deserialize)]
struct FioReport {
    jobs: Vec<Value>,
}

/// Runs fio with the test's command as job description.
#[derive(Clone, Copy, Debug, Default)]
pub struct FioTest;

impl FioTest {
    /// Path of the JSON report for the test `name`.
    pub fn report_path(results_dir: &Path, name: &str) -> PathBuf {
        results_dir.join(format!("{name}.json"))
    }

    /// The fio invocation shared by every fio test, writing its report to
    /// [`report_path`](Self::report_path).
    pub fn default_cmd(results_dir: &Path, name: &str) -> String {
        format!(
            "fio --output-format=json --output={} {FIXED_FLAGS}",
            Self::report_path(results_dir, name).display()
        )
    }

    /// Reads all jobs of a fio JSON report, in report order.
    pub fn read_report(path: &Path) -> PerfResult<Vec<FioResult>> {
        let json_error = |source: serde_json::Error| PerfError::Json {
            path: path.to_owned(),
            source,
        };

        let file = File::open(path).map_err(PerfError::io(path))?;
        let report: FioReport =
            serde_json::from_reader(BufReader::new(file)).map_err(json_error)?;
        report
            .jobs
            .into_iter()
            .map(|job| FioResult::from_job(job).map_err(json_error))
            .collect()
    }
}

impl Benchmark for FioTest {
    fn test(&mut self, spec: &TestSpec, env: &TestEnv<'_>) -> PerfResult<()> {
        let directory = env.settings.directory()?;
        let command = format!(
            "{} --directory {directory} {}",
            Self::default_cmd(env.results_dir, &spec.name),
            spec.command
        );
        env.runner.run(command.trim_end(), None)
    }

    fn record_results(
        &self,
        spec: &TestSpec,
        env: &TestEnv<'_>,
        run: &mut RunResults,
    ) -> PerfResult<()> {
        let path = Self::report_path(env.results_dir, &spec.name);
        let jobs = Self::read_report(&path)?;
        tracing::debug!(test = %spec.name, jobs = jobs.len(), "parsed fio report");
        run.fio_results.extend(jobs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::command::fake::RecordingRunner;
    use crate::lifecycle::PerfTest;

    use super::*;

    const REPORT: &str = r#"{
        "fio version": "fio-3.36",
        "timestamp": 1700000000,
        "global options": { "directory": "/mnt/test" },
        "jobs": [
            {
                "jobname": "seqwrite",
                "groupid": 0,
                "error": 0,
                "elapsed": 31,
                "write": { "io_bytes": 1073741824, "bw_bytes": 35791394, "iops": 8738.13, "runtime": 30000 },
                "usr_cpu": 2.5,
                "sys_cpu": 40.1
            },
            {
                "jobname": "randread",
                "groupid": 1,
                "error": 0,
                "elapsed": 31,
                "read": {
                    "io_bytes": 52428800,
                    "bw_bytes": 1747626,
                    "iops": 426.66,
                    "runtime": 30000,
                    "clat_ns": { "min": 800, "max": 90000, "mean": 2100.25, "percentile": { "99.000000": 81920 } }
                },
                "usr_cpu": 0.5,
                "sys_cpu": 3.0
            }
        ]
    }"#;

    fn settings() -> BTreeMap<String, BTreeMap<String, String>> {
        BTreeMap::from([(
            "main".to_owned(),
            BTreeMap::from([("directory".to_owned(), "/mnt/test".to_owned())]),
        )])
    }

    #[test]
    fn default_cmd_has_fixed_flags() {
        let cmd = FioTest::default_cmd(Path::new("results"), "randwrite");
        assert!(cmd.starts_with("fio --output-format=json"));
        assert!(cmd.contains("--output=results/randwrite.json"));
        assert!(cmd.contains("--alloc-size 98304"));
        assert!(cmd.contains("--allrandrepeat=1"));
        assert!(cmd.contains("--randseed=12345"));

        let cmd = FioTest::default_cmd(Path::new("/var/tmp/fsperf"), "other");
        assert!(cmd.contains("--output=/var/tmp/fsperf/other.json"));
        assert!(cmd.contains(FIXED_FLAGS));
    }

    #[test]
    fn composes_command() {
        let settings = settings();
        let runner = RecordingRunner::default();
        let env = TestEnv {
            settings: &settings,
            runner: &runner,
            results_dir: Path::new("results"),
        };

        let spec = TestSpec::new("randwrite", "--name=randwrite --rw=randwrite --size=1g");
        FioTest.test(&spec, &env).unwrap();

        assert_eq!(
            runner.commands(),
            ["fio --output-format=json --output=results/randwrite.json \
              --alloc-size 98304 --allrandrepeat=1 --randseed=12345 \
              --directory /mnt/test --name=randwrite --rw=randwrite --size=1g"]
        );
    }

    #[test]
    fn records_one_result_per_job() {
        let results_dir = tempfile::tempdir().unwrap();
        std::fs::write(results_dir.path().join("mixed.json"), REPORT).unwrap();

        let settings = settings();
        let runner = RecordingRunner::default();
        let env = TestEnv {
            settings: &settings,
            runner: &runner,
            results_dir: results_dir.path(),
        };
        let mut test = PerfTest::fio(TestSpec::new("mixed", "jobs.fio"));
        let mut run = RunResults::new("mixed", "main", "test");

        test.run(&mut run, &env, "main").unwrap();

        assert_eq!(run.fio_results.len(), 2);
        let [seq, rand] = &run.fio_results[..] else {
            unreachable!();
        };
        assert_eq!(seq.jobname, "seqwrite");
        assert_eq!(seq.write.bw_bytes, 35791394);
        assert_eq!(seq.sys_cpu, 40.1);
        assert_eq!(rand.jobname, "randread");
        assert_eq!(rand.read.clat_ns.percentile_at(99.0), Some(81920));
        assert!(run.time_results.is_empty());

        // Parsing only depends on the report contents.
        let mut again = RunResults::new("mixed", "main", "test");
        test.record_results(&env, &mut again).unwrap();
        assert_eq!(again.fio_results, run.fio_results);
    }

    #[test]
    fn missing_report_is_an_error() {
        let results_dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let runner = RecordingRunner::default();
        let env = TestEnv {
            settings: &settings,
            runner: &runner,
            results_dir: results_dir.path(),
        };
        let mut run = RunResults::new("absent", "main", "test");

        let err = FioTest
            .record_results(&TestSpec::new("absent", ""), &env, &mut run)
            .unwrap_err();

        assert!(matches!(err, PerfError::Io { .. }), "{err:?}");
        assert!(run.fio_results.is_empty());
    }

    #[test]
    fn job_with_wrong_types_is_an_error() {
        let results_dir = tempfile::tempdir().unwrap();
        let path = results_dir.path().join("odd.json");
        std::fs::write(&path, r#"{ "jobs": [ { "jobname": "odd", "error": "none" } ] }"#).unwrap();

        let err = FioTest::read_report(&path).unwrap_err();
        assert!(matches!(err, PerfError::Json { .. }), "{err:?}");
    }

    #[test]
    fn malformed_report_is_an_error() {
        let results_dir = tempfile::tempdir().unwrap();
        std::fs::write(results_dir.path().join("cut.json"), &REPORT[..200]).unwrap();

        let err = FioTest::read_report(&results_dir.path().join("cut.json")).unwrap_err();
        assert!(matches!(err, PerfError::Json { .. }), "{err:?}");
    }
}
