//! Volume records tracked by the registry and the view handed to adapters.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

/// Backend hints supplied at creation time.
pub type VolumeOptions = BTreeMap<String, String>;

/// A named persistent volume and its mount state.
///
/// `mount_path` is `Some` exactly while the volume is mounted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    name: String,
    mount_path: Option<Utf8PathBuf>,
    options: VolumeOptions,
}

impl Volume {
    /// Creates an unmounted volume.
    #[must_use]
    pub fn new(name: impl Into<String>, options: VolumeOptions) -> Self {
        Self {
            name: name.into(),
            mount_path: None,
            options,
        }
    }

    /// Registry key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory backing the volume while mounted.
    #[must_use]
    pub fn mount_path(&self) -> Option<&Utf8Path> {
        self.mount_path.as_deref()
    }

    /// Options passed to `create`.
    #[must_use]
    pub const fn options(&self) -> &VolumeOptions {
        &self.options
    }

    /// Whether the volume is mounted.
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mount_path.is_some()
    }

    /// Adapter-facing projection.
    #[must_use]
    pub fn view(&self) -> VolumeView {
        VolumeView {
            name: self.name.clone(),
            mount_path: self
                .mount_path
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    pub(crate) fn set_mount_path(&mut self, path: Utf8PathBuf) {
        self.mount_path = Some(path);
    }

    pub(crate) fn clear_mount_path(&mut self) -> Option<Utf8PathBuf> {
        self.mount_path.take()
    }
}

/// Name and mount point as reported to the orchestrator. An empty
/// `mount_path` means the volume is not mounted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeView {
    /// Volume name.
    pub name: String,
    /// Mount directory, or empty.
    pub mount_path: String,
}
