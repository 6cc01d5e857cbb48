//! In-memory table of known volumes with per-volume locking.
//!
//! The map itself is guarded by a short-lived mutex. Each entry carries its
//! own async mutex that callers hold for a whole lifecycle operation, so
//! operations on one volume are serialised while other volumes proceed.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::volume::Volume;

#[derive(Debug)]
struct Slot {
    volume: Volume,
    retired: bool,
}

type SharedSlot = Arc<Mutex<Slot>>;

/// Registry of volumes keyed by name.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    entries: Mutex<HashMap<String, SharedSlot>>,
}

/// Exclusive access to one registered volume.
///
/// Other operations on the same volume wait until the entry is dropped.
#[derive(Debug)]
pub struct VolumeEntry {
    slot: SharedSlot,
    guard: OwnedMutexGuard<Slot>,
}

impl Deref for VolumeEntry {
    type Target = Volume;

    fn deref(&self) -> &Self::Target {
        &self.guard.volume
    }
}

impl DerefMut for VolumeEntry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.volume
    }
}

impl VolumeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `volume` under its name.
    ///
    /// # Errors
    ///
    /// Returns the volume back when the name is already registered.
    pub async fn insert(&self, volume: Volume) -> Result<(), Volume> {
        let mut entries = self.entries.lock().await;
        match entries.entry(volume.name().to_owned()) {
            Entry::Occupied(_) => Err(volume),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(Slot {
                    volume,
                    retired: false,
                })));
                Ok(())
            }
        }
    }

    /// Locks the volume named `name`, waiting for any in-flight operation on
    /// it to finish. Returns `None` when no such volume is registered,
    /// including when it was removed while this call was waiting.
    pub async fn lock(&self, name: &str) -> Option<VolumeEntry> {
        loop {
            let slot = Arc::clone(self.entries.lock().await.get(name)?);
            let guard = Arc::clone(&slot).lock_owned().await;
            if !guard.retired {
                return Some(VolumeEntry { slot, guard });
            }
            // Retired entries leave the map before their lock is released;
            // look again in case the name was re-created meanwhile.
        }
    }

    /// Removes the locked volume from the registry.
    pub async fn retire(&self, mut entry: VolumeEntry) {
        entry.guard.retired = true;
        let mut entries = self.entries.lock().await;
        if entries
            .get(entry.name())
            .is_some_and(|current| Arc::ptr_eq(current, &entry.slot))
        {
            entries.remove(entry.name());
        }
    }

    /// Snapshot of every registered volume, sorted by name. Waits for
    /// in-flight operations so the snapshot only contains settled state.
    pub async fn snapshot(&self) -> Vec<Volume> {
        let slots: Vec<SharedSlot> = self.entries.lock().await.values().cloned().collect();

        let mut volumes = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot.lock().await;
            if !guard.retired {
                volumes.push(guard.volume.clone());
            }
        }
        volumes.sort_by(|left, right| left.name().cmp(right.name()));
        volumes
    }

    /// Number of registered volumes.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no volumes are registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::volume::VolumeOptions;

    fn volume(name: &str) -> Volume {
        Volume::new(name, VolumeOptions::new())
    }

    #[tokio::test]
    async fn duplicate_insert_returns_the_volume() {
        let registry = VolumeRegistry::new();
        assert!(registry.insert(volume("data")).await.is_ok());

        let rejected = registry.insert(volume("data")).await;

        assert_eq!(rejected, Err(volume("data")));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn entry_mutations_are_persisted() {
        let registry = VolumeRegistry::new();
        assert!(registry.insert(volume("data")).await.is_ok());

        {
            let mut entry = registry
                .lock("data")
                .await
                .unwrap_or_else(|| panic!("entry should exist"));
            entry.set_mount_path(Utf8PathBuf::from("/mnt/cloudvol-data"));
        }

        let entry = registry
            .lock("data")
            .await
            .unwrap_or_else(|| panic!("entry should exist"));
        assert!(entry.is_mounted());
    }

    #[tokio::test]
    async fn retired_entry_is_not_found_by_waiters() {
        let registry = Arc::new(VolumeRegistry::new());
        assert!(registry.insert(volume("data")).await.is_ok());
        let entry = registry
            .lock("data")
            .await
            .unwrap_or_else(|| panic!("entry should exist"));

        let waiter = {
            let shared = Arc::clone(&registry);
            tokio::spawn(async move { shared.lock("data").await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.retire(entry).await;

        let found = waiter
            .await
            .unwrap_or_else(|err| panic!("waiter panicked: {err}"));
        assert!(!found);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn different_names_do_not_block_each_other() {
        let registry = VolumeRegistry::new();
        assert!(registry.insert(volume("a")).await.is_ok());
        assert!(registry.insert(volume("b")).await.is_ok());

        let _held = registry
            .lock("a")
            .await
            .unwrap_or_else(|| panic!("a should exist"));
        let other = tokio::time::timeout(Duration::from_millis(100), registry.lock("b")).await;

        assert!(matches!(other, Ok(Some(_))));
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_name() {
        let registry = VolumeRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            assert!(registry.insert(volume(name)).await.is_ok());
        }

        let names: Vec<String> = registry
            .snapshot()
            .await
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect();

        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
