//! Synchronous execution of external commands.

use std::fmt;
use std::fs::File;
use std::process::{Command, Stdio};

use crate::error::{PerfError, PerfResult};

/// Runs command lines on behalf of a test.
pub trait CommandRunner: fmt::Debug {
    /// Runs `command` to completion.
    ///
    /// When `stdout` is given, the command's standard output is written to that file, otherwise it
    /// is discarded. A command that cannot be started or exits unsuccessfully is an error.
    fn run(&self, command: &str, stdout: Option<&File>) -> PerfResult<()>;
}

/// Runs commands through `sh -c`, blocking until they exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, stdout: Option<&File>) -> PerfResult<()> {
        tracing::info!(command, "running command");

        let spawn_error = |source| PerfError::Spawn {
            command: command.to_owned(),
            source,
        };

        let stdout = match stdout {
            Some(file) => Stdio::from(file.try_clone().map_err(spawn_error)?),
            None => Stdio::null(),
        };

        let output = shell(command)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            tracing::error!(command, status = %output.status, "command failed");
            return Err(PerfError::CommandFailed {
                command: command.to_owned(),
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

/// Creates a `sh -c <command>` invocation with stdin detached.
pub(crate) fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).stdin(Stdio::null());
    cmd
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::io::Write;

    use super::*;

    /// Records commands instead of running them, optionally "printing" canned output.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub commands: RefCell<Vec<String>>,
        pub stdout: Option<String>,
    }

    impl RecordingRunner {
        pub fn with_stdout(stdout: impl Into<String>) -> Self {
            Self {
                commands: Default::default(),
                stdout: Some(stdout.into()),
            }
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.borrow().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &str, stdout: Option<&File>) -> PerfResult<()> {
            self.commands.borrow_mut().push(command.to_owned());
            if let (Some(mut file), Some(text)) = (stdout, &self.stdout) {
                file.write_all(text.as_bytes()).unwrap();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek};

    use super::*;

    #[test]
    fn captures_stdout_into_file() {
        let mut file = tempfile::tempfile().unwrap();
        ShellRunner.run("echo hello; echo world", Some(&file)).unwrap();

        file.rewind().unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello\nworld\n");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let err = ShellRunner.run("echo oops >&2; exit 3", None).unwrap_err();
        let PerfError::CommandFailed { status, stderr, .. } = err else {
            panic!("expected command failure, got {err:?}");
        };
        assert_eq!(status.code(), Some(3));
        assert_eq!(stderr, "oops");
    }

    #[test]
    fn missing_tool_is_an_error() {
        let err = ShellRunner
            .run("definitely-not-an-installed-benchmark --json", None)
            .unwrap_err();
        // `sh` reports unknown commands with exit status 127.
        assert!(matches!(err, PerfError::CommandFailed { .. }));
    }
}
