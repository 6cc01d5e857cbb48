//! Deterministic mapping from volume names to device identifiers and paths.

use camino::Utf8PathBuf;

/// Device name prefix applied to logical volume names.
pub const DEVICE_NAME_PREFIX: &str = "docker-volume-";

/// Location where Compute Engine exposes attached disks by device name.
pub const GCE_DEVICE_PATH_PREFIX: &str = "/dev/disk/by-id/google-";

/// Naming convention shared by attach, detach and mount.
///
/// Device paths are computed rather than discovered, so the same volume name
/// always resolves to the same device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceNaming {
    name_prefix: String,
    path_prefix: String,
}

impl DeviceNaming {
    /// Creates a naming convention from explicit prefixes.
    #[must_use]
    pub fn new(name_prefix: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            path_prefix: path_prefix.into(),
        }
    }

    /// Naming used by Compute Engine persistent disks.
    #[must_use]
    pub fn gce() -> Self {
        Self::new(DEVICE_NAME_PREFIX, GCE_DEVICE_PATH_PREFIX)
    }

    /// Device identifier requested from the backend for `volume`.
    #[must_use]
    pub fn device_name(&self, volume: &str) -> String {
        format!("{}{volume}", self.name_prefix)
    }

    /// Host-visible path of an attached device.
    #[must_use]
    pub fn device_path(&self, device_name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}{device_name}", self.path_prefix))
    }
}

impl Default for DeviceNaming {
    fn default() -> Self {
        Self::gce()
    }
}
