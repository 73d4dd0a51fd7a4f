//! Prints a summary of finished runs and persists their results.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use fsperf_core::RunResults;
use fsperf_core::results::FioIoStats;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

/// Directory of persisted runs, kept apart from the raw tool reports in `results_dir`.
pub fn runs_dir(results_dir: &Path) -> PathBuf {
    results_dir.join("runs")
}

/// Path of the persisted results of `run`.
pub fn run_path(results_dir: &Path, run: &RunResults) -> PathBuf {
    runs_dir(results_dir).join(format!("{}.json", run.id))
}

/// Writes `run` as JSON into the runs directory, creating it if needed.
pub fn persist(results_dir: &Path, run: &RunResults) -> Result<PathBuf> {
    let dir = runs_dir(results_dir);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let path = run_path(results_dir, run);
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, run)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Reads back results written by [`persist`].
pub fn load(path: &Path) -> Result<RunResults> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let run = serde_json::from_reader(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(run)
}

/// Prints all runs, grouped by section and test in the order they ran.
pub fn print(runs: &[RunResults]) {
    let mut groups: Vec<(&str, &str, Vec<&RunResults>)> = Vec::new();
    for run in runs {
        match groups
            .iter_mut()
            .find(|(config, name, _)| *config == run.config && *name == run.name)
        {
            Some((_, _, group)) => group.push(run),
            None => groups.push((run.config.as_str(), run.name.as_str(), vec![run])),
        }
    }

    let mut section = None;
    for (config, name, group) in groups {
        if section != Some(config) {
            println!();
            println!("{} {}", "## Section".bold(), config.bold().blue());
            section = Some(config);
        }

        println!();
        println!(
            "{} {} ({} runs, kernel {})",
            "###".bold(),
            name.bold(),
            group.len().bold(),
            group[0].kernel
        );
        print_time(&group);
        print_fio(&group);
        print_dbench(&group);
    }
}

fn print_time(group: &[&RunResults]) {
    let mut sketch = DDSketch::default();
    for result in group.iter().flat_map(|run| &run.time_results) {
        sketch.add(result.elapsed);
    }

    if sketch.count() > 0 {
        println!("{} ({} samples)", "TIME:".bold().green(), sketch.count().bold());
        print_percentiles(&sketch, Duration::from_secs_f64);
    }
}

fn print_fio(group: &[&RunResults]) {
    let mut jobs: Vec<(&str, FioMetrics)> = Vec::new();
    for job in group.iter().flat_map(|run| &run.fio_results) {
        let index = match jobs.iter().position(|(name, _)| *name == job.jobname) {
            Some(index) => index,
            None => {
                jobs.push((job.jobname.as_str(), FioMetrics::default()));
                jobs.len() - 1
            }
        };
        let metrics = &mut jobs[index].1;
        metrics.read.add(&job.read);
        metrics.write.add(&job.write);
    }

    for (name, metrics) in jobs {
        println!("{} {}", "FIO:".bold().green(), name.bold());
        metrics.read.print("read");
        metrics.write.print("write");
    }
}

fn print_dbench(group: &[&RunResults]) {
    let mut throughput = DDSketch::default();
    for result in group.iter().flat_map(|run| &run.dbench_results) {
        if let Some(value) = result.throughput() {
            throughput.add(value);
        }
    }

    let Some(last) = group.iter().rev().find_map(|run| run.dbench_results.last()) else {
        return;
    };

    print!("{}", "DBENCH:".bold().green());
    if throughput.count() > 0 {
        print!(" {:.2} MB/sec", avg(&throughput).bold());
    } else {
        print!(" {}", "no throughput reported".red());
    }
    println!();

    let operations: Vec<_> = last
        .operations()
        .map(|(op, value)| format!("{op}: {value}"))
        .collect();
    if !operations.is_empty() {
        println!("  {}", operations.join("; "));
    }
}

/// Aggregated statistics of one direction of one fio job.
#[derive(Default)]
struct FioDirection {
    bandwidth: DDSketch,
    iops: DDSketch,
    p99_clat: DDSketch,
}

impl FioDirection {
    fn add(&mut self, stats: &FioIoStats) {
        if stats.io_bytes == 0 {
            return;
        }
        self.bandwidth.add(stats.bw_bytes as f64);
        self.iops.add(stats.iops);
        if let Some(p99) = stats.clat_ns.percentile_at(99.0) {
            self.p99_clat.add(p99 as f64);
        }
    }

    fn print(&self, direction: &str) {
        if self.bandwidth.count() == 0 {
            return;
        }
        print!(
            "  {direction}: {}/s, {:.2} IOPS",
            ByteSize::b(avg(&self.bandwidth) as u64).bold(),
            avg(&self.iops)
        );
        if self.p99_clat.count() > 0 {
            let p99 = Duration::from_nanos(avg(&self.p99_clat) as u64);
            print!(", p99 clat: {p99:.2?}");
        }
        println!();
    }
}

#[derive(Default)]
struct FioMetrics {
    read: FioDirection,
    write: FioDirection,
}

fn avg(sketch: &DDSketch) -> f64 {
    match sketch.sum() {
        Some(sum) if sketch.count() > 0 => sum / sketch.count() as f64,
        _ => 0.0,
    }
}

fn quantile(sketch: &DDSketch, q: f64) -> f64 {
    sketch.quantile(q).ok().flatten().unwrap_or_default()
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let avg = map(avg(sketch));
    let p50 = map(quantile(sketch, 0.5));
    let p90 = map(quantile(sketch, 0.9));
    let p99 = map(quantile(sketch, 0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}
