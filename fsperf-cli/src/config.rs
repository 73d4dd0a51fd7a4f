//! Configuration for fsperf.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `FSPERF__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration, for example
//! `FSPERF__SECTIONS__MAIN__DIRECTORY=/mnt/test` or `FSPERF__LOGGING__LEVEL=debug`.
//!
//! # YAML Configuration File
//!
//! ```yaml
//! results_dir: results
//! iterations: 3
//!
//! sections:
//!   main:
//!     directory: /mnt/test
//!   btrfs:
//!     device: /dev/nvme0n1
//!     mkfs: mkfs.btrfs -f
//!     mount_opts: noatime
//!
//! tests:
//!   - name: randwrite
//!     type: fio
//!     command: --name=randwrite --rw=randwrite --size=4g
//!   - name: untar
//!     type: time
//!     command: tar -xf /srv/linux.tar -C DIRECTORY
//!     need_remount_after_setup: true
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use fsperf_core::{MAIN_SECTION, PerfTest, Settings, TestSpec};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "FSPERF__";

/// The benchmark tool a test is run with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// `fio` with the command as job description.
    Fio,
    /// An arbitrary command whose wall-clock time is measured.
    Time,
    /// `dbench` with the command as arguments.
    Dbench,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::Fio => "fio",
            TestKind::Time => "time",
            TestKind::Dbench => "dbench",
        };
        f.write_str(name)
    }
}

/// A configured test.
///
/// Used in: [`Config::tests`]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TestDefinition {
    /// Which tool runs this test.
    #[serde(rename = "type")]
    pub kind: TestKind,

    /// Name, command and flags of the test.
    #[serde(flatten)]
    pub spec: TestSpec,
}

impl TestDefinition {
    /// Creates a fresh test instance for one run.
    pub fn build(&self) -> PerfTest {
        let spec = self.spec.clone();
        match self.kind {
            TestKind::Fio => PerfTest::fio(spec),
            TestKind::Time => PerfTest::time(spec),
            TestKind::Dbench => PerfTest::dbench(spec),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// [`LogFormat::Pretty`] when stderr is a terminal, [`LogFormat::Simplified`] otherwise.
    Auto,

    /// Colored, human readable lines.
    Pretty,

    /// Compact lines without colors, suitable for log files.
    Simplified,

    /// One JSON object per line.
    Json,
}

/// Logging configuration.
///
/// Logs are always written to stderr, so they never mix with the report on stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Main configuration struct for fsperf.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Directory for raw tool reports and persisted run results.
    ///
    /// # Default
    ///
    /// `results`
    pub results_dir: PathBuf,

    /// How many times every test runs per section.
    ///
    /// # Default
    ///
    /// `1`
    pub iterations: usize,

    /// Settings by section.
    ///
    /// The `main` section must define `directory`, where the benchmarks run. Every other section
    /// describes one filesystem configuration to test, using the keys `device`, `mkfs`,
    /// `mount_opts` and `trace_command`. Keys missing from a section are looked up in `main`.
    pub sections: BTreeMap<String, BTreeMap<String, String>>,

    /// The tests to run, in order.
    pub tests: Vec<TestDefinition>,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            iterations: 1,
            sections: BTreeMap::new(),
            tests: Vec::new(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file at `path` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if values have the wrong
    /// type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// The filesystem configurations to run tests under.
    ///
    /// These are all sections except `main`. If there are none, tests run once under `main`.
    pub fn test_sections(&self) -> Vec<&str> {
        let sections: Vec<_> = self
            .sections
            .keys()
            .map(String::as_str)
            .filter(|s| *s != MAIN_SECTION)
            .collect();

        if sections.is_empty() {
            vec![MAIN_SECTION]
        } else {
            sections
        }
    }
}

impl Settings for Config {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        let lookup = |section: &str| self.sections.get(section)?.get(key).map(String::as_str);
        lookup(section).or_else(|| lookup(MAIN_SECTION))
    }
}
