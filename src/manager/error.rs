//! Errors returned by [`super::VolumeManager`].

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::driver::StorageError;
use crate::fs::FsError;

/// Distinguishable failure categories surfaced to adapters.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A volume with the requested name is already registered.
    AlreadyExists,
    /// No volume with the requested name is registered.
    NotFound,
    /// The volume is already mounted.
    AlreadyMounted,
    /// The volume is not mounted.
    NotMounted,
    /// The name cannot be used as a volume name.
    InvalidName,
    /// A local directory operation failed.
    Io,
    /// The mount tooling failed.
    Mount,
    /// The block storage backend failed to attach the disk.
    Attach,
    /// The block storage backend failed to detach the disk.
    Detach,
    /// A backend operation missed its deadline.
    Timeout,
}

impl ErrorKind {
    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::AlreadyMounted => "already_mounted",
            Self::NotMounted => "not_mounted",
            Self::InvalidName => "invalid_name",
            Self::Io => "io",
            Self::Mount => "mount",
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by volume lifecycle operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VolumeError {
    /// Raised by `create` for a name that is already registered.
    #[error("volume {name} already exists")]
    AlreadyExists {
        /// Volume name.
        name: String,
    },
    /// Raised when the named volume is not registered.
    #[error("volume {name} not found")]
    NotFound {
        /// Volume name.
        name: String,
    },
    /// Raised by `mount` on a mounted volume.
    #[error("volume {name} is already mounted at {path}")]
    AlreadyMounted {
        /// Volume name.
        name: String,
        /// Current mount path.
        path: Utf8PathBuf,
    },
    /// Raised by `unmount` on a volume that is not mounted.
    #[error("volume {name} is not mounted")]
    NotMounted {
        /// Volume name.
        name: String,
    },
    /// Raised by `create` for names that cannot form a mount directory.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
    /// Raised when the mount directory cannot be checked or created.
    #[error("failed to prepare mount directory {path} for volume {name}: {source}")]
    MountDirectory {
        /// Volume name.
        name: String,
        /// Mount directory.
        path: Utf8PathBuf,
        /// Underlying filesystem failure.
        source: FsError,
    },
    /// Raised when the storage driver fails to mount the volume.
    #[error("failed to mount volume {name}: {source}")]
    Mount {
        /// Volume name.
        name: String,
        /// Driver failure.
        source: StorageError,
    },
    /// Raised when the storage driver fails to unmount the volume.
    #[error("failed to unmount volume {name}: {source}")]
    Unmount {
        /// Volume name.
        name: String,
        /// Driver failure.
        source: StorageError,
    },
}

impl VolumeError {
    /// Category of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyMounted { .. } => ErrorKind::AlreadyMounted,
            Self::NotMounted { .. } => ErrorKind::NotMounted,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::MountDirectory { .. } => ErrorKind::Io,
            Self::Mount { source, .. } | Self::Unmount { source, .. } => source.kind(),
        }
    }
}
