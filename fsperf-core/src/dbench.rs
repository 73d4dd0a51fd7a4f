//! Tests driven by `dbench`, scraped from its plain-text report.
//!
//! dbench ends its output with a table of operations followed by a summary line:
//!
//! ```text
//!  Operation      Count    AvgLat    MaxLat
//!  ----------------------------------------
//!  NTCreateX     392561     0.015     4.870
//!  ReadX        1744232     0.004     3.010
//!  ...
//! Throughput 456.78 MB/sec  4 clients  4 procs  max_latency=13.468 ms
//! ```
//!
//! There is no real grammar here. Lines are classified by their token count only, so a change in
//! dbench's report format shows up as missing or wrong keys rather than as an error.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

use crate::error::{PerfError, PerfResult};
use crate::lifecycle::{Benchmark, TestEnv, TestSpec};
use crate::results::{DbenchResult, RunResults};

/// Marks the start of the operations table.
const SEPARATOR: &str = "----";

/// Runs dbench with the test's command as arguments.
#[derive(Clone, Debug, Default)]
pub struct DbenchTest {
    results: Option<DbenchResult>,
}

impl DbenchTest {
    /// Path of the raw text report for the test `name`.
    pub fn report_path(results_dir: &Path, name: &str) -> PathBuf {
        results_dir.join(format!("{name}.txt"))
    }

    /// Values parsed by the last run.
    pub fn results(&self) -> Option<&DbenchResult> {
        self.results.as_ref()
    }

    /// Scrapes a dbench report.
    ///
    /// Everything up to the first line containing `----` is skipped. After that, a line with
    /// exactly four tokens maps its lowercased first token to the fourth, and a line with more than
    /// four tokens stores its second token as throughput. All other lines are ignored.
    pub fn parse_report(reader: impl BufRead) -> io::Result<DbenchResult> {
        let mut values = BTreeMap::new();
        let mut parse = false;

        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);

            if !parse {
                parse = line.contains(SEPARATOR);
                continue;
            }

            let vals: Vec<&str> = line.split_whitespace().collect();
            match vals.len() {
                4 => values.insert(vals[0].to_lowercase(), vals[3].to_owned()),
                n if n > 4 => {
                    values.insert(DbenchResult::THROUGHPUT.to_owned(), vals[1].to_owned())
                }
                _ => None,
            };
        }

        Ok(DbenchResult::from_map(values))
    }

    fn read_back(file: &mut File) -> io::Result<DbenchResult> {
        file.rewind()?;
        Self::parse_report(BufReader::new(file))
    }
}

impl Benchmark for DbenchTest {
    fn test(&mut self, spec: &TestSpec, env: &TestEnv<'_>) -> PerfResult<()> {
        let directory = env.settings.directory()?;
        let command = format!("dbench {} -D {directory}", spec.command);

        let path = Self::report_path(env.results_dir, &spec.name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(PerfError::io(&path))?;

        env.runner.run(&command, Some(&file))?;

        let results = Self::read_back(&mut file).map_err(PerfError::io(&path))?;
        if results.throughput().is_none() {
            tracing::warn!(test = %spec.name, "no throughput found in dbench report");
        }
        self.results = Some(results);

        Ok(())
    }

    fn record_results(
        &self,
        spec: &TestSpec,
        _env: &TestEnv<'_>,
        run: &mut RunResults,
    ) -> PerfResult<()> {
        let results = self.results.clone().ok_or_else(|| PerfError::NoOutput {
            name: spec.name.clone(),
        })?;
        run.dbench_results.push(results);
        Ok(())
    }
}
