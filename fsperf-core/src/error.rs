use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur while running a performance test.
#[derive(Debug, Error)]
pub enum PerfError {
    /// The command could not be started, e.g. because the tool is not installed.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// The full command line.
        command: String,
        /// The underlying spawn error.
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("`{command}` failed with {status}: {stderr}")]
    CommandFailed {
        /// The full command line.
        command: String,
        /// Exit status of the process.
        status: ExitStatus,
        /// Whatever the process wrote to stderr, trimmed.
        stderr: String,
    },

    /// A report file could not be created, read or rewound.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// The file the error relates to.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The fio JSON report could not be decoded.
    #[error("malformed fio report {}: {source}", path.display())]
    Json {
        /// The report file.
        path: PathBuf,
        /// The underlying decode error.
        source: serde_json::Error,
    },

    /// A required configuration value is missing.
    #[error("missing setting `{key}` in section `{section}`")]
    MissingSetting {
        /// Section that was looked up.
        section: String,
        /// Key that was looked up.
        key: String,
    },

    /// Results were requested before the test produced any output.
    #[error("test `{name}` has no output to record")]
    NoOutput {
        /// Name of the test.
        name: String,
    },
}

impl PerfError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PerfError::Io { path, source }
    }
}

/// Result type for performance test operations.
pub type PerfResult<T> = Result<T, PerfError>;
