//! Driver selection made once at startup.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use super::{BlockDeviceStorage, DriverFuture, LocalStorage, StorageDriver};
use crate::block::gce::{GceBackend, GceSettings};
use crate::block::{BackendError, DeviceNaming, PollSettings, PollingBlockStorage};
use crate::fs::OsFileSystem;
use crate::volume::Volume;

/// Block storage backed by Compute Engine persistent disks.
pub type GceBlockStorage = PollingBlockStorage<GceBackend>;

/// Storage driver variants selectable by configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    /// Volumes live in their mount directories.
    Fs,
    /// Volumes are Compute Engine persistent disks.
    Gce,
}

impl StorageMode {
    /// Configuration value for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Gce => "gce",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a mode string names no known driver.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown storage mode '{0}' (expected 'fs' or 'gce')")]
pub struct UnknownStorageMode(pub String);

impl FromStr for StorageMode {
    type Err = UnknownStorageMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fs" => Ok(Self::Fs),
            "gce" => Ok(Self::Gce),
            _ => Err(UnknownStorageMode(value.to_owned())),
        }
    }
}

/// The driver chosen at startup.
#[derive(Clone, Debug)]
pub enum ConfiguredDriver {
    /// Local passthrough.
    Local(LocalStorage),
    /// Compute Engine persistent disks mounted through the host tools.
    Gce(BlockDeviceStorage<GceBlockStorage, OsFileSystem>),
}

impl ConfiguredDriver {
    /// Builds the driver for `mode`. Compute Engine discovery only runs for
    /// [`StorageMode::Gce`].
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] when the Compute Engine identity
    /// cannot be resolved.
    pub async fn build(
        mode: StorageMode,
        gce: GceSettings,
        poll: PollSettings,
        fs: OsFileSystem,
    ) -> Result<Self, BackendError> {
        info!(%mode, "selecting storage driver");
        match mode {
            StorageMode::Fs => Ok(Self::Local(LocalStorage)),
            StorageMode::Gce => {
                let backend = GceBackend::discover(gce).await?;
                let block = PollingBlockStorage::new(backend, DeviceNaming::gce(), poll);
                Ok(Self::Gce(BlockDeviceStorage::new(block, fs)))
            }
        }
    }

    /// Mode this driver was built for.
    #[must_use]
    pub const fn mode(&self) -> StorageMode {
        match self {
            Self::Local(_) => StorageMode::Fs,
            Self::Gce(_) => StorageMode::Gce,
        }
    }
}

impl StorageDriver for ConfiguredDriver {
    fn mount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        match self {
            Self::Local(driver) => driver.mount(volume),
            Self::Gce(driver) => driver.mount(volume),
        }
    }

    fn unmount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        match self {
            Self::Local(driver) => driver.unmount(volume),
            Self::Gce(driver) => driver.unmount(volume),
        }
    }
}
