//! Normalized result records and the per-run accumulator they are appended to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::latency::LatencyTrace;

/// Wall-clock duration of a timed command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TimeResult {
    /// Elapsed time in seconds.
    pub elapsed: f64,
}

/// Latency summary as reported by fio, in nanoseconds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FioLatency {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    /// Percentiles keyed by fio's own labels, e.g. `"99.000000"`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub percentile: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FioLatency {
    /// Looks up a percentile such as `99.0`, matching fio's key formatting.
    pub fn percentile_at(&self, pct: f64) -> Option<u64> {
        self.percentile.get(&format!("{pct:.6}")).copied()
    }
}

/// Per-direction statistics of a fio job (`read`, `write` or `trim`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FioIoStats {
    pub io_bytes: u64,
    pub bw_bytes: u64,
    pub iops: f64,
    /// Runtime of this direction in milliseconds.
    pub runtime: u64,
    pub total_ios: u64,
    pub slat_ns: FioLatency,
    pub clat_ns: FioLatency,
    pub lat_ns: FioLatency,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One job from a fio JSON report.
///
/// Well-known values are decoded into typed fields; every other key of the job
/// mapping is kept verbatim in [`extra`](Self::extra).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FioResult {
    pub jobname: String,
    pub groupid: u64,
    pub error: i64,
    /// Job runtime in seconds.
    pub elapsed: u64,
    pub read: FioIoStats,
    pub write: FioIoStats,
    pub trim: FioIoStats,
    pub usr_cpu: f64,
    pub sys_cpu: f64,
    pub ctx: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FioResult {
    /// Builds a result from a raw job mapping of a fio report.
    pub fn from_job(job: Value) -> serde_json::Result<Self> {
        serde_json::from_value(job)
    }
}

/// Values scraped from a dbench report.
///
/// Keys are lowercase operation names (`"readx"`, `"writex"`, ...) plus the
/// distinguished [`THROUGHPUT`](Self::THROUGHPUT) key. Values are kept as the
/// tokens dbench printed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DbenchResult {
    values: BTreeMap<String, String>,
}

impl DbenchResult {
    /// Key of the summary throughput value.
    pub const THROUGHPUT: &'static str = "throughput";

    /// Wraps an already parsed mapping.
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Returns the raw token stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value under `key` parsed as a number.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Overall throughput in MB/sec, if the summary line was found.
    pub fn throughput(&self) -> Option<f64> {
        self.get_f64(Self::THROUGHPUT)
    }

    /// Per-operation values, excluding the throughput summary.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(k, _)| k.as_str() != Self::THROUGHPUT)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

/// Accumulates the results of a single test run.
///
/// Adapters only ever append to the result sequences.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RunResults {
    /// Unique, time-ordered identifier of this run.
    pub id: Uuid,
    /// Name of the test that produced these results.
    pub name: String,
    /// Configuration section the test ran under.
    pub config: String,
    /// Kernel release of the machine under test.
    pub kernel: String,
    /// Zero-based iteration of the test within its section.
    pub iteration: usize,
    /// Latency trace taken around the measured part of the test.
    #[serde(default)]
    pub latency_trace: Option<LatencyTrace>,

    pub time_results: Vec<TimeResult>,
    pub fio_results: Vec<FioResult>,
    pub dbench_results: Vec<DbenchResult>,
}

impl RunResults {
    /// Creates an empty accumulator for the named test.
    pub fn new(
        name: impl Into<String>,
        config: impl Into<String>,
        kernel: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            config: config.into(),
            kernel: kernel.into(),
            iteration: 0,
            latency_trace: None,
            time_results: Vec::new(),
            fio_results: Vec::new(),
            dbench_results: Vec::new(),
        }
    }

    /// Sets the iteration number.
    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.time_results.is_empty()
            && self.fio_results.is_empty()
            && self.dbench_results.is_empty()
    }
}
