//! Volume lifecycle orchestration.
//!
//! [`VolumeManager`] owns the registry and enforces the state machine:
//! volumes are created unmounted, `mount` assigns a deterministic directory
//! and hands the volume to the storage driver, and `unmount` reverses it.
//! A failed mount rolls the path back; a failed unmount keeps the volume
//! mounted so the caller can retry.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::driver::StorageDriver;
use crate::fs::FileSystem;
use crate::registry::{VolumeEntry, VolumeRegistry};
use crate::volume::{Volume, VolumeOptions, VolumeView};

mod error;

pub use error::{ErrorKind, VolumeError};

/// Prefix of every mount directory name.
pub const MOUNT_DIR_PREFIX: &str = "cloudvol-";
/// Permission bits for newly created mount directories.
pub const MOUNT_DIR_MODE: u32 = 0o700;

/// Maps volume names to mount directories under a base directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountLayout {
    base: Utf8PathBuf,
}

impl MountLayout {
    /// Places mount directories under `base`.
    #[must_use]
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory.
    #[must_use]
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Mount directory for `name`: `<base>/cloudvol-<name>`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> Utf8PathBuf {
        self.base.join(format!("{MOUNT_DIR_PREFIX}{name}"))
    }
}

/// Orchestrates volume lifecycle calls over a storage driver and the local
/// filesystem.
#[derive(Debug)]
pub struct VolumeManager<D, F> {
    registry: VolumeRegistry,
    driver: D,
    fs: F,
    layout: MountLayout,
}

fn validate_name(name: &str) -> Result<(), VolumeError> {
    let reason = if name.trim().is_empty() {
        Some("name must not be empty")
    } else if name.contains('/') {
        Some("name must not contain '/'")
    } else if name.contains('\0') {
        Some("name must not contain NUL")
    } else if name == "." || name == ".." {
        Some("name must not be a relative path component")
    } else {
        None
    };

    reason.map_or(Ok(()), |why| {
        Err(VolumeError::InvalidName {
            name: name.to_owned(),
            reason: why,
        })
    })
}

impl<D: StorageDriver, F: FileSystem> VolumeManager<D, F> {
    /// Creates a manager with an empty registry.
    #[must_use]
    pub fn new(driver: D, fs: F, layout: MountLayout) -> Self {
        Self {
            registry: VolumeRegistry::new(),
            driver,
            fs,
            layout,
        }
    }

    /// Mount directory layout.
    #[must_use]
    pub const fn layout(&self) -> &MountLayout {
        &self.layout
    }

    /// Registers a new, unmounted volume.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidName`] for names that cannot be used as
    /// a directory component and [`VolumeError::AlreadyExists`] for
    /// duplicates.
    pub async fn create(&self, name: &str, options: VolumeOptions) -> Result<VolumeView, VolumeError> {
        validate_name(name)?;

        let volume = Volume::new(name, options);
        let view = volume.view();
        self.registry
            .insert(volume)
            .await
            .map_err(|_| VolumeError::AlreadyExists {
                name: name.to_owned(),
            })?;

        info!(name, "created volume");
        Ok(view)
    }

    /// Removes a volume, unmounting it first when mounted.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotFound`] for unknown names. Unmount failures
    /// abort the removal and leave the volume mounted.
    pub async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let mut entry = self.entry(name).await?;
        if entry.is_mounted() {
            info!(name, "unmounting volume before removal");
            self.unmount_entry(&mut entry).await?;
        }

        self.registry.retire(entry).await;
        info!(name, "removed volume");
        Ok(())
    }

    /// Returns the named volume.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotFound`] for unknown names.
    pub async fn get(&self, name: &str) -> Result<VolumeView, VolumeError> {
        Ok(self.entry(name).await?.view())
    }

    /// Lists every registered volume, sorted by name.
    pub async fn list(&self) -> Vec<VolumeView> {
        self.registry
            .snapshot()
            .await
            .iter()
            .map(Volume::view)
            .collect()
    }

    /// Mounts the named volume and returns its mount directory.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotFound`], [`VolumeError::AlreadyMounted`],
    /// [`VolumeError::MountDirectory`] when the directory cannot be prepared,
    /// or [`VolumeError::Mount`] when the driver fails. The volume is left
    /// unmounted on every error.
    pub async fn mount(&self, name: &str) -> Result<Utf8PathBuf, VolumeError> {
        let mut entry = self.entry(name).await?;
        if let Some(path) = entry.mount_path() {
            return Err(VolumeError::AlreadyMounted {
                name: name.to_owned(),
                path: path.to_path_buf(),
            });
        }

        let path = self.layout.path_for(name);
        self.ensure_directory(name, &path)?;

        entry.set_mount_path(path.clone());
        if let Err(source) = self.driver.mount(&entry).await {
            entry.clear_mount_path();
            warn!(name, path = %path, error = %source, "mount failed");
            return Err(VolumeError::Mount {
                name: name.to_owned(),
                source,
            });
        }

        info!(name, path = %path, "mounted volume");
        Ok(path)
    }

    /// Unmounts the named volume.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotFound`], [`VolumeError::NotMounted`], or
    /// [`VolumeError::Unmount`] when the driver fails, in which case the
    /// volume stays mounted.
    pub async fn unmount(&self, name: &str) -> Result<(), VolumeError> {
        let mut entry = self.entry(name).await?;
        self.unmount_entry(&mut entry).await
    }

    async fn entry(&self, name: &str) -> Result<VolumeEntry, VolumeError> {
        self.registry
            .lock(name)
            .await
            .ok_or_else(|| VolumeError::NotFound {
                name: name.to_owned(),
            })
    }

    fn ensure_directory(&self, name: &str, path: &Utf8Path) -> Result<(), VolumeError> {
        let to_error = |source| VolumeError::MountDirectory {
            name: name.to_owned(),
            path: path.to_path_buf(),
            source,
        };

        if self.fs.dir_exists(path).map_err(to_error)? {
            return Ok(());
        }
        info!(name, path = %path, "creating mount directory");
        self.fs
            .create_dir(path, true, MOUNT_DIR_MODE)
            .map_err(to_error)
    }

    async fn unmount_entry(&self, entry: &mut VolumeEntry) -> Result<(), VolumeError> {
        let name = entry.name().to_owned();
        let Some(path) = entry.mount_path().map(Utf8Path::to_path_buf) else {
            return Err(VolumeError::NotMounted { name });
        };

        if let Err(source) = self.driver.unmount(&**entry).await {
            warn!(name, path = %path, error = %source, "unmount failed; volume stays mounted");
            return Err(VolumeError::Unmount { name, source });
        }

        if let Err(err) = self.fs.remove_dir(&path, false) {
            warn!(name, path = %path, error = %err, "failed to remove mount directory");
        }
        entry.clear_mount_path();
        info!(name, path = %path, "unmounted volume");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
