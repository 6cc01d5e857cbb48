//! Storage drivers: make a volume's contents available at its mount path.
//!
//! A driver receives the volume for the duration of one call with
//! `mount_path` already assigned. [`LocalStorage`] relies on the directory the
//! manager created; [`BlockDeviceStorage`] attaches a durable disk and mounts
//! it there.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::block::BlockStorageError;
use crate::fs::FsError;
use crate::manager::ErrorKind;
use crate::volume::Volume;

mod block;
mod configured;
mod local;

pub use block::BlockDeviceStorage;
pub use configured::{ConfiguredDriver, GceBlockStorage, StorageMode, UnknownStorageMode};
pub use local::LocalStorage;

/// Future returned by [`StorageDriver`] methods.
pub type DriverFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>>;

/// Mounts and unmounts volumes at their assigned paths.
pub trait StorageDriver: Send + Sync {
    /// Makes the volume available at `volume.mount_path()`.
    fn mount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a>;

    /// Reverses [`StorageDriver::mount`].
    fn unmount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a>;
}

/// Errors raised by storage drivers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StorageError {
    /// Local directory or mount tooling failure.
    #[error(transparent)]
    Fs(#[from] FsError),
    /// Attach, detach or operation timeout.
    #[error(transparent)]
    Block(#[from] BlockStorageError),
    /// The driver was handed a volume without a mount path.
    #[error("volume {name} has no mount path")]
    MissingMountPath {
        /// Volume name.
        name: String,
    },
}

impl StorageError {
    /// Classifies the failure for callers that branch on error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Fs(FsError::Io { .. }) => ErrorKind::Io,
            Self::Fs(FsError::Spawn { .. } | FsError::Command { .. }) => ErrorKind::Mount,
            Self::Block(BlockStorageError::Attach { .. }) => ErrorKind::Attach,
            Self::Block(BlockStorageError::Detach { .. }) => ErrorKind::Detach,
            Self::Block(BlockStorageError::Timeout { .. }) => ErrorKind::Timeout,
            Self::MissingMountPath { .. } => ErrorKind::NotMounted,
        }
    }
}
