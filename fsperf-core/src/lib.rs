//! Building blocks for filesystem performance tests.
//!
//! A [`PerfTest`] pairs a [`TestSpec`] (name, command and flags of one configured test) with a
//! [`Benchmark`] that knows how to run one particular external tool and how to normalize its
//! output:
//!
//! - [`FioTest`] runs `fio` and decodes its JSON report into one [`FioResult`] per job.
//! - [`DbenchTest`] runs `dbench` and scrapes its text report into a [`DbenchResult`].
//! - [`TimeTest`] times an arbitrary shell command into a [`TimeResult`].
//!
//! Every run is synchronous: a test blocks until the tool exits. Results are appended to a
//! [`RunResults`] accumulator owned by the caller.
#![warn(missing_debug_implementations)]

pub mod command;
pub mod dbench;
pub mod error;
pub mod fio;
pub mod latency;
pub mod lifecycle;
pub mod mount;
pub mod results;
pub mod settings;
pub mod time;

pub use crate::command::{CommandRunner, ShellRunner};
pub use crate::dbench::DbenchTest;
pub use crate::error::{PerfError, PerfResult};
pub use crate::fio::FioTest;
pub use crate::latency::{LatencyTrace, LatencyTracing};
pub use crate::lifecycle::{Benchmark, PerfTest, TestEnv, TestSpec};
pub use crate::mount::{MountManager, Remount};
pub use crate::results::{DbenchResult, FioResult, RunResults, TimeResult};
pub use crate::settings::{MAIN_SECTION, Settings};
pub use crate::time::TimeTest;
