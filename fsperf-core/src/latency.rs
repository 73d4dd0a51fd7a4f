//! Latency tracing scoped around the measured part of a test.
//!
//! A section can configure a `trace_command`, for example a `bpftrace` script that prints latency
//! histograms of interesting kernel functions when it is stopped. The command is started before
//! the test and stopped right after it, and whatever it printed becomes part of the
//! [`LatencyTrace`].

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::command::shell;
use crate::error::{PerfError, PerfResult};
use crate::settings::Settings;

/// The finalized result of a [`LatencyTracing`] scope.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LatencyTrace {
    /// The section the trace was taken for.
    pub section: String,
    /// Time spent inside the traced scope.
    pub elapsed: Duration,
    /// Output of the trace command, if one was configured.
    pub output: Option<String>,
}

/// An active latency-tracing scope.
///
/// Call [`finish`](Self::finish) to stop tracing and collect the trace. If the scope is dropped
/// instead, the trace command is still stopped and reaped.
#[derive(Debug)]
pub struct LatencyTracing {
    section: String,
    start: Instant,
    tracer: Option<Child>,
}

impl LatencyTracing {
    /// Starts tracing for `section`, spawning its `trace_command` if configured.
    pub fn start(settings: &dyn Settings, section: &str) -> PerfResult<Self> {
        let tracer = match settings.get(section, "trace_command") {
            Some(command) => {
                tracing::debug!(command, section, "starting latency tracer");
                // Own process group, so pipelines in the command can be stopped as a whole.
                let child = shell(command)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .process_group(0)
                    .spawn()
                    .map_err(|source| PerfError::Spawn {
                        command: command.to_owned(),
                        source,
                    })?;
                Some(child)
            }
            None => None,
        };

        Ok(Self {
            section: section.to_owned(),
            start: Instant::now(),
            tracer,
        })
    }

    /// Stops tracing and returns the collected trace.
    pub fn finish(mut self) -> LatencyTrace {
        let elapsed = self.start.elapsed();
        let output = self.tracer.take().map(|child| stop_tracer(child, Signal::SIGINT));

        LatencyTrace {
            section: std::mem::take(&mut self.section),
            elapsed,
            output,
        }
    }
}

impl Drop for LatencyTracing {
    fn drop(&mut self) {
        if let Some(child) = self.tracer.take() {
            stop_tracer(child, Signal::SIGKILL);
        }
    }
}

/// Signals the tracer's process group, then drains its output and reaps it.
///
/// Tracers like `bpftrace` print their maps on `SIGINT`, so that is what a finished scope sends.
fn stop_tracer(mut child: Child, signal: Signal) -> String {
    // The group id equals the pid of its leader, the `sh` running the command.
    let pgrp = Pid::from_raw(child.id() as i32);
    // The tracer may already have exited on its own.
    if let Err(error) = signal::killpg(pgrp, signal) {
        tracing::debug!(%error, "failed to signal tracer");
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        if let Err(error) = stdout.read_to_string(&mut output) {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "failed to read trace output"
            );
        }
    }

    if let Err(error) = child.wait() {
        tracing::warn!(error = &error as &dyn std::error::Error, "failed to reap tracer");
    }

    output
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, BTreeMap<String, String>> {
        let section = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BTreeMap::from([("btrfs".to_owned(), section)])
    }

    #[test]
    fn without_trace_command() {
        let settings = settings(&[]);
        let scope = LatencyTracing::start(&settings, "btrfs").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let trace = scope.finish();

        assert_eq!(trace.section, "btrfs");
        assert!(trace.elapsed >= Duration::from_millis(10));
        assert_eq!(trace.output, None);
    }

    #[test]
    fn collects_tracer_output() {
        // The tracer prints and then lingers until it is killed.
        let settings = settings(&[("trace_command", "echo traced; exec sleep 30")]);
        let scope = LatencyTracing::start(&settings, "btrfs").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let trace = scope.finish();

        assert_eq!(trace.output.as_deref(), Some("traced\n"));
        assert!(trace.elapsed < Duration::from_secs(30));
    }

    #[test]
    fn stops_pipelines() {
        let settings = settings(&[("trace_command", "echo traced; sleep 30 | cat")]);
        let scope = LatencyTracing::start(&settings, "btrfs").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        let trace = scope.finish();
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
        assert_eq!(trace.output.as_deref(), Some("traced\n"));
    }

    #[test]
    fn drop_stops_pipelines() {
        let settings = settings(&[("trace_command", "sleep 30 | cat; sleep 30")]);
        let scope = LatencyTracing::start(&settings, "btrfs").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        drop(scope);
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
    }

    #[test]
    fn drop_stops_tracer() {
        let settings = settings(&[("trace_command", "exec sleep 30")]);
        let start = Instant::now();
        drop(LatencyTracing::start(&settings, "btrfs").unwrap());
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
