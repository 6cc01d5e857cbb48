//! Error types for local filesystem operations.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by the filesystem port.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FsError {
    /// Raised when a directory cannot be inspected, created or removed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when an external program cannot be started.
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Error reported by the operating system.
        message: String,
    },
    /// Raised when `mount`, `umount` or `mkfs` exits unsuccessfully.
    #[error("{command} exited with status {status_text}: {output}")]
    Command {
        /// Shell-quoted command line that was executed.
        command: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Combined stdout and stderr captured from the command.
        output: String,
    },
}

impl FsError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
