//! Runs the configured tests, one after another.

use std::fs;

use anyhow::{Context, Result, bail};
use fsperf_core::{CommandRunner, MountManager, RunResults, TestEnv};

use crate::config::{Config, TestDefinition};
use crate::report;

/// Which tests to run and how often.
#[derive(Debug, Default)]
pub struct Selection {
    /// Names of the tests to run. Empty means all configured tests.
    pub tests: Vec<String>,
    /// Overrides [`Config::iterations`].
    pub iterations: Option<usize>,
}

/// Sequentially runs tests in every configured section.
#[derive(Debug)]
pub struct Driver<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    kernel: String,
}

impl<'a> Driver<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            kernel: kernel_release(),
        }
    }

    /// Runs the selected tests and persists every run's results as soon as it completes.
    ///
    /// `oneoff` tests only run in the first section. The first failing test aborts the session.
    pub fn run(&self, selection: &Selection) -> Result<Vec<RunResults>> {
        let tests = self.select(&selection.tests)?;
        let iterations = selection.iterations.unwrap_or(self.config.iterations);

        fs::create_dir_all(&self.config.results_dir).with_context(|| {
            format!(
                "failed to create results directory {}",
                self.config.results_dir.display()
            )
        })?;

        let mut runs = Vec::new();
        for (index, section) in self.config.test_sections().into_iter().enumerate() {
            for definition in &tests {
                if definition.spec.oneoff && index > 0 {
                    tracing::debug!(test = %definition.spec.name, section, "skipping oneoff test");
                    continue;
                }

                for iteration in 0..iterations {
                    let run = self
                        .run_one(definition, section, iteration)
                        .with_context(|| {
                            format!(
                                "test `{}` failed in section `{section}`",
                                definition.spec.name
                            )
                        })?;
                    report::persist(&self.config.results_dir, &run)?;
                    runs.push(run);
                }
            }
        }

        Ok(runs)
    }

    fn select(&self, names: &[String]) -> Result<Vec<&'a TestDefinition>> {
        for name in names {
            if !self.config.tests.iter().any(|t| &t.spec.name == name) {
                bail!("unknown test `{name}`");
            }
        }

        let tests: Vec<_> = self
            .config
            .tests
            .iter()
            .filter(|t| names.is_empty() || names.contains(&t.spec.name))
            .collect();

        if tests.is_empty() {
            bail!("no tests configured");
        }
        Ok(tests)
    }

    fn run_one(
        &self,
        definition: &TestDefinition,
        section: &str,
        iteration: usize,
    ) -> Result<RunResults> {
        let env = TestEnv {
            settings: self.config,
            runner: self.runner,
            results_dir: &self.config.results_dir,
        };

        let mut test = definition.build();
        let mut run = RunResults::new(test.name(), section, self.kernel.as_str())
            .with_iteration(iteration);

        // Unmounts on drop, also when the test fails.
        let mut mount = MountManager::new(self.config, section, self.runner)?;
        if !test.spec().skip_mkfs_and_mount {
            mount.mkfs()?;
            mount.mount()?;
        }

        test.setup(&env, section)?;
        test.maybe_cycle_mount(&mut mount)?;
        test.run(&mut run, &env, section)?;
        run.latency_trace = test.latency_trace().cloned();
        test.teardown(&env, &run)?;
        mount.umount()?;

        tracing::info!(
            test = %run.name,
            section,
            iteration,
            elapsed = ?run.latency_trace.as_ref().map(|t| t.elapsed),
            "test finished"
        );

        Ok(run)
    }
}

/// The running kernel's release, e.g. `6.8.0-41-generic`.
fn kernel_release() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => uts.release().to_string_lossy().into_owned(),
        Err(error) => {
            tracing::warn!(%error, "failed to determine kernel release");
            "unknown".to_owned()
        }
    }
}
