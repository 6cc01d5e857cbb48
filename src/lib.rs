//! Core library for the cloudvol Docker volume plugin.
//!
//! The crate tracks named volumes and their mount state, and fulfils mount
//! requests through a storage driver: either plain directories on the local
//! filesystem or Compute Engine persistent disks that are attached to this
//! host, polled to completion and mounted (create → mount → unmount →
//! remove).

pub mod block;
pub mod config;
pub mod driver;
pub mod fs;
pub mod manager;
pub mod plugin;
pub mod registry;
pub mod test_support;
pub mod volume;

pub use block::{
    BackendError, BlockStorage, BlockStorageError, DeviceNaming, OperationBackend,
    OperationHandle, OperationStatus, PollSettings, PollingBlockStorage,
};
pub use config::{CloudvolConfig, ConfigError};
pub use driver::{
    BlockDeviceStorage, ConfiguredDriver, LocalStorage, StorageDriver, StorageError, StorageMode,
};
pub use fs::{FileSystem, FsError, FsPrograms, OsFileSystem};
pub use manager::{ErrorKind, MountLayout, VolumeError, VolumeManager};
pub use plugin::{ListenAddress, ServeError, VolumePlugin, router, serve};
pub use registry::VolumeRegistry;
pub use volume::{Volume, VolumeOptions, VolumeView};
