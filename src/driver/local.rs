//! Passthrough driver for volumes backed by the local filesystem.

use tracing::info;

use super::{DriverFuture, StorageDriver};
use crate::volume::Volume;

/// Driver whose volumes live directly in the mount directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStorage;

impl StorageDriver for LocalStorage {
    fn mount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        Box::pin(async move {
            info!(name = volume.name(), mount_path = ?volume.mount_path(), "mount local volume");
            Ok(())
        })
    }

    fn unmount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        Box::pin(async move {
            info!(name = volume.name(), mount_path = ?volume.mount_path(), "unmount local volume");
            Ok(())
        })
    }
}
