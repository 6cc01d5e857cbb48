//! Driver that composes block storage attachment with a filesystem mount.

use camino::Utf8Path;
use tracing::{info, warn};

use super::{DriverFuture, StorageDriver, StorageError};
use crate::block::BlockStorage;
use crate::fs::FileSystem;
use crate::volume::Volume;

/// Attaches a durable disk per volume and mounts it at the volume's path.
///
/// A filesystem mount failure after a successful attach leaves the disk
/// attached. Unmount never detaches a disk whose filesystem is still mounted.
#[derive(Clone, Debug)]
pub struct BlockDeviceStorage<B, F> {
    block: B,
    fs: F,
}

impl<B: BlockStorage, F: FileSystem> BlockDeviceStorage<B, F> {
    /// Composes a block storage port with a filesystem port.
    #[must_use]
    pub const fn new(block: B, fs: F) -> Self {
        Self { block, fs }
    }

    /// Returns the block storage port.
    #[must_use]
    pub const fn block(&self) -> &B {
        &self.block
    }

    /// Returns the filesystem port.
    #[must_use]
    pub const fn fs(&self) -> &F {
        &self.fs
    }
}

fn target_of(volume: &Volume) -> Result<&Utf8Path, StorageError> {
    volume
        .mount_path()
        .ok_or_else(|| StorageError::MissingMountPath {
            name: volume.name().to_owned(),
        })
}

impl<B: BlockStorage, F: FileSystem> StorageDriver for BlockDeviceStorage<B, F> {
    fn mount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        Box::pin(async move {
            let target = target_of(volume)?;
            let device = self.block.attach(volume.name()).await?;

            info!(name = volume.name(), device = %device, target = %target, "mount device");
            self.fs.mount(&device, target).map_err(|err| {
                warn!(name = volume.name(), device = %device, error = %err, "mount failed; disk stays attached");
                StorageError::from(err)
            })
        })
    }

    fn unmount<'a>(&'a self, volume: &'a Volume) -> DriverFuture<'a> {
        Box::pin(async move {
            let target = target_of(volume)?;

            info!(name = volume.name(), target = %target, "unmount device");
            self.fs.unmount(target)?;
            self.block.detach(volume.name()).await?;
            Ok(())
        })
    }
}
