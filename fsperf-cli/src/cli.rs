use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use fsperf_core::ShellRunner;
use yansi::Paint;

use crate::config::Config;
use crate::driver::{Driver, Selection};
use crate::{observability, report};

/// Filesystem performance test harness.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    List(ListCommand),
    Version(VersionCommand),
}

/// run the configured tests and print a report
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// only run the test with this name, can be repeated
    #[argh(option, short = 't')]
    test: Vec<String>,

    /// how many times to run every test, overriding the configuration
    #[argh(option, short = 'n')]
    iterations: Option<usize>,
}

/// list the configured tests
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCommand {}

/// print the fsperf version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Parse the command line and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Needs neither configuration nor logging.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    observability::init_tracing(&config);
    tracing::debug!(?config);

    match args.command {
        Command::Run(RunCommand { test, iterations }) => {
            let selection = Selection {
                tests: test,
                iterations,
            };
            let runs = Driver::new(&config, &ShellRunner).run(&selection)?;
            report::print(&runs);
            Ok(())
        }
        Command::List(ListCommand {}) => {
            list(&config);
            Ok(())
        }
        Command::Version(VersionCommand {}) => unreachable!(),
    }
}

fn list(config: &Config) {
    for test in &config.tests {
        let spec = &test.spec;
        let mut flags = Vec::new();
        if spec.need_remount_after_setup {
            flags.push("remount");
        }
        if spec.skip_mkfs_and_mount {
            flags.push("no-mkfs");
        }
        if spec.oneoff {
            flags.push("oneoff");
        }

        print!("{} ({})", spec.name.bold(), test.kind.blue());
        if !flags.is_empty() {
            print!(" [{}]", flags.join(", "));
        }
        println!(": {}", spec.command);
    }
}
