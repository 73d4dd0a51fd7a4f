//! The `fsperf` command line harness.
//!
//! Loads a configuration of tests and filesystem sections, runs every test through
//! [`fsperf_core`], persists the results and prints a report.
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod observability;
pub mod report;
