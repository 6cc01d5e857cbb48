//! Unit tests for the volume state machine.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};

use super::*;
use crate::driver::{BlockDeviceStorage, LocalStorage, StorageError};
use crate::test_support::{CallLog, RecordingFileSystem, ScriptedBlockStorage};

type BlockManager =
    VolumeManager<BlockDeviceStorage<ScriptedBlockStorage, RecordingFileSystem>, RecordingFileSystem>;

struct Harness {
    log: CallLog,
    block: ScriptedBlockStorage,
    fs: RecordingFileSystem,
    manager: BlockManager,
}

#[fixture]
fn harness() -> Harness {
    let log = CallLog::default();
    let block = ScriptedBlockStorage::new(log.clone());
    let fs = RecordingFileSystem::new(log.clone());
    let manager = VolumeManager::new(
        BlockDeviceStorage::new(block.clone(), fs.clone()),
        fs.clone(),
        MountLayout::new("/mnt"),
    );
    Harness {
        log,
        block,
        fs,
        manager,
    }
}

fn options(pairs: &[(&str, &str)]) -> VolumeOptions {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

async fn created(harness: &Harness, name: &str) {
    harness
        .manager
        .create(name, VolumeOptions::new())
        .await
        .unwrap_or_else(|err| panic!("create {name}: {err}"));
}

async fn mounted(harness: &Harness, name: &str) -> Utf8PathBuf {
    created(harness, name).await;
    harness
        .manager
        .mount(name)
        .await
        .unwrap_or_else(|err| panic!("mount {name}: {err}"))
}

#[rstest]
#[case("/data", "/data/cloudvol-v1")]
#[case("/mnt", "/mnt/cloudvol-v1")]
fn mount_path_is_base_plus_prefixed_name(#[case] base: &str, #[case] expected: &str) {
    assert_eq!(
        MountLayout::new(base).path_for("v1"),
        Utf8PathBuf::from(expected)
    );
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("a/b")]
#[case("nul\0byte")]
#[case("..")]
#[tokio::test]
async fn create_rejects_unusable_names(harness: Harness, #[case] name: &str) {
    let result = harness.manager.create(name, VolumeOptions::new()).await;

    let Err(err) = result else {
        panic!("{name:?} should be rejected");
    };
    assert_eq!(err.kind(), ErrorKind::InvalidName);
    assert!(harness.manager.list().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn duplicate_create_keeps_a_single_volume(harness: Harness) {
    created(&harness, "data").await;

    let result = harness.manager.create("data", VolumeOptions::new()).await;

    assert_eq!(
        result,
        Err(VolumeError::AlreadyExists {
            name: String::from("data"),
        })
    );
    assert_eq!(harness.manager.list().await.len(), 1);
}

#[rstest]
#[tokio::test]
async fn create_keeps_options_and_starts_unmounted(harness: Harness) {
    let view = harness
        .manager
        .create("data", options(&[("size", "10G")]))
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(view.mount_path, "");
    let entry = harness
        .manager
        .registry
        .lock("data")
        .await
        .unwrap_or_else(|| panic!("data should be registered"));
    assert_eq!(entry.options().get("size").map(String::as_str), Some("10G"));
}

#[rstest]
#[tokio::test]
async fn unknown_names_are_not_found(harness: Harness) {
    for result in [
        harness.manager.get("ghost").await.map(|_| ()),
        harness.manager.mount("ghost").await.map(|_| ()),
        harness.manager.unmount("ghost").await,
        harness.manager.remove("ghost").await,
    ] {
        assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::NotFound));
    }
}

#[rstest]
#[tokio::test]
async fn mount_creates_directory_then_attaches_and_mounts(harness: Harness) {
    let path = mounted(&harness, "v1").await;

    assert_eq!(path, Utf8PathBuf::from("/mnt/cloudvol-v1"));
    assert!(harness.fs.has_dir(&path));
    assert_eq!(
        harness.log.calls(),
        vec![
            String::from("create_dir /mnt/cloudvol-v1 700"),
            String::from("attach v1"),
            String::from("mount /dev/disk/by-id/google-docker-volume-v1 /mnt/cloudvol-v1"),
        ]
    );
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "/mnt/cloudvol-v1");
}

#[rstest]
#[tokio::test]
async fn second_mount_is_rejected_and_path_is_unchanged(harness: Harness) {
    let path = mounted(&harness, "v1").await;

    let result = harness.manager.mount("v1").await;

    assert_eq!(
        result,
        Err(VolumeError::AlreadyMounted {
            name: String::from("v1"),
            path: path.clone(),
        })
    );
    assert_eq!(harness.log.count("attach"), 1);
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, path.as_str());
}

#[rstest]
#[tokio::test]
async fn second_unmount_is_not_mounted(harness: Harness) {
    mounted(&harness, "v1").await;
    harness
        .manager
        .unmount("v1")
        .await
        .unwrap_or_else(|err| panic!("unmount: {err}"));

    let result = harness.manager.unmount("v1").await;

    assert_eq!(
        result,
        Err(VolumeError::NotMounted {
            name: String::from("v1"),
        })
    );
}

#[rstest]
#[tokio::test]
async fn remount_resolves_the_same_path(harness: Harness) {
    let first = mounted(&harness, "v1").await;
    harness
        .manager
        .unmount("v1")
        .await
        .unwrap_or_else(|err| panic!("unmount: {err}"));

    let second = harness
        .manager
        .mount("v1")
        .await
        .unwrap_or_else(|err| panic!("remount: {err}"));

    assert_eq!(first, second);
}

#[rstest]
#[tokio::test]
async fn existing_directory_is_reused(harness: Harness) {
    harness
        .fs
        .create_dir(Utf8Path::new("/mnt/cloudvol-v1"), true, 0o755)
        .unwrap_or_else(|err| panic!("seed dir: {err}"));

    mounted(&harness, "v1").await;

    assert_eq!(harness.log.count("create_dir"), 1);
}

#[rstest]
#[tokio::test]
async fn remove_unmounts_mounted_volume(harness: Harness) {
    mounted(&harness, "v1").await;

    harness
        .manager
        .remove("v1")
        .await
        .unwrap_or_else(|err| panic!("remove: {err}"));

    assert_eq!(harness.log.count("unmount /mnt/cloudvol-v1"), 1);
    assert_eq!(harness.log.count("detach v1"), 1);
    assert_eq!(
        harness.manager.get("v1").await.map_err(|err| err.kind()),
        Err(ErrorKind::NotFound)
    );
}

#[rstest]
#[tokio::test]
async fn remove_is_aborted_when_unmount_fails(harness: Harness) {
    mounted(&harness, "v1").await;
    harness.fs.fail_unmount("target is busy");

    let result = harness.manager.remove("v1").await;

    assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::Mount));
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("volume should survive: {err}"));
    assert_eq!(view.mount_path, "/mnt/cloudvol-v1");
}

#[rstest]
#[tokio::test]
async fn attach_timeout_leaves_volume_unmounted_and_directory_in_place(harness: Harness) {
    created(&harness, "v1").await;
    harness.block.timeout_attach();

    let result = harness.manager.mount("v1").await;

    let Err(err) = result else {
        panic!("mount should time out");
    };
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "");
    assert!(harness.fs.has_dir(Utf8Path::new("/mnt/cloudvol-v1")));
}

#[rstest]
#[tokio::test]
async fn filesystem_mount_failure_rolls_back_path(harness: Harness) {
    created(&harness, "v1").await;
    harness.fs.fail_mount("wrong fs type");

    let result = harness.manager.mount("v1").await;

    assert!(matches!(
        result,
        Err(VolumeError::Mount {
            source: StorageError::Fs(_),
            ..
        })
    ));
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "");
}

#[rstest]
#[tokio::test]
async fn directory_failure_is_io_and_skips_driver(harness: Harness) {
    created(&harness, "v1").await;
    harness.fs.fail_create_dir("permission denied");

    let result = harness.manager.mount("v1").await;

    let Err(err) = result else {
        panic!("mount should fail");
    };
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("/mnt/cloudvol-v1"), "{err}");
    assert_eq!(harness.log.count("attach"), 0);
}

#[rstest]
#[tokio::test]
async fn directory_check_failure_is_io_and_leaves_volume_unmounted(harness: Harness) {
    created(&harness, "v1").await;
    harness.fs.fail_dir_exists("stale file handle");

    let result = harness.manager.mount("v1").await;

    let Err(err) = result else {
        panic!("mount should fail");
    };
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("stale file handle"), "{err}");
    assert_eq!(harness.log.count("attach"), 0);
    assert_eq!(harness.log.count("create_dir"), 0);
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "");
}

#[tokio::test]
async fn polled_attach_timeout_rolls_back_mount_path() {
    use std::time::Duration;

    use crate::block::{DeviceNaming, PollSettings, PollingBlockStorage};
    use crate::test_support::ScriptedOperationBackend;

    let log = CallLog::default();
    let fs = RecordingFileSystem::new(log.clone());
    let backend = ScriptedOperationBackend::new();
    let block = PollingBlockStorage::new(
        backend.clone(),
        DeviceNaming::gce(),
        PollSettings {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        },
    );
    let manager = VolumeManager::new(
        BlockDeviceStorage::new(block, fs.clone()),
        fs.clone(),
        MountLayout::new("/mnt"),
    );
    manager
        .create("v1", VolumeOptions::new())
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let result = manager.mount("v1").await;

    let Err(err) = result else {
        panic!("mount should time out");
    };
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(
        err.to_string().contains("op-attach-docker-volume-v1"),
        "{err}"
    );
    assert_eq!(backend.started(), vec![String::from("attach:docker-volume-v1")]);
    assert!(backend.status_calls() >= 1);
    assert_eq!(log.count("mount "), 0);
    let view = manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "");
    assert!(fs.has_dir(Utf8Path::new("/mnt/cloudvol-v1")));
}

#[rstest]
#[tokio::test]
async fn unmount_failure_skips_detach_and_keeps_path(harness: Harness) {
    mounted(&harness, "v1").await;
    harness.fs.fail_unmount("target is busy");

    let result = harness.manager.unmount("v1").await;

    let Err(err) = result else {
        panic!("unmount should fail");
    };
    assert_eq!(err.kind(), ErrorKind::Mount);
    assert_eq!(harness.log.count("detach"), 0);
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "/mnt/cloudvol-v1");
}

#[rstest]
#[tokio::test]
async fn unmount_retry_after_failure_completes(harness: Harness) {
    mounted(&harness, "v1").await;
    harness.fs.fail_unmount("target is busy");
    assert!(harness.manager.unmount("v1").await.is_err());
    harness.fs.heal();

    harness
        .manager
        .unmount("v1")
        .await
        .unwrap_or_else(|err| panic!("retry: {err}"));

    assert_eq!(harness.log.count("unmount"), 2);
    assert_eq!(harness.log.count("detach"), 1);
}

#[rstest]
#[tokio::test]
async fn detach_failure_keeps_volume_mounted(harness: Harness) {
    mounted(&harness, "v1").await;
    harness.block.fail_detach("disk busy");

    let result = harness.manager.unmount("v1").await;

    assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::Detach));
    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "/mnt/cloudvol-v1");
}

#[rstest]
#[tokio::test]
async fn directory_cleanup_failure_only_warns(harness: Harness) {
    mounted(&harness, "v1").await;
    harness.fs.fail_remove_dir("directory not empty");

    harness
        .manager
        .unmount("v1")
        .await
        .unwrap_or_else(|err| panic!("unmount: {err}"));

    let view = harness
        .manager
        .get("v1")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    assert_eq!(view.mount_path, "");
}

#[rstest]
#[tokio::test]
async fn data_volume_scenario(harness: Harness) {
    harness
        .manager
        .create("data", options(&[("size", "10G")]))
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));
    assert_eq!(
        harness.manager.get("data").await,
        Ok(VolumeView {
            name: String::from("data"),
            mount_path: String::new(),
        })
    );

    let path = harness
        .manager
        .mount("data")
        .await
        .unwrap_or_else(|err| panic!("mount: {err}"));
    assert_eq!(
        harness.manager.list().await,
        vec![VolumeView {
            name: String::from("data"),
            mount_path: path.to_string(),
        }]
    );

    harness
        .manager
        .unmount("data")
        .await
        .unwrap_or_else(|err| panic!("unmount: {err}"));
    assert_eq!(
        harness.manager.get("data").await.map(|view| view.mount_path),
        Ok(String::new())
    );
}

#[tokio::test]
async fn local_driver_only_manages_directories() {
    let log = CallLog::default();
    let fs = RecordingFileSystem::new(log.clone());
    let manager = VolumeManager::new(LocalStorage, fs.clone(), MountLayout::new("/srv"));

    manager
        .create("cache", VolumeOptions::new())
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));
    let path = manager
        .mount("cache")
        .await
        .unwrap_or_else(|err| panic!("mount: {err}"));
    manager
        .unmount("cache")
        .await
        .unwrap_or_else(|err| panic!("unmount: {err}"));

    assert_eq!(path, Utf8PathBuf::from("/srv/cloudvol-cache"));
    assert_eq!(
        log.calls(),
        vec![
            String::from("create_dir /srv/cloudvol-cache 700"),
            String::from("remove_dir /srv/cloudvol-cache"),
        ]
    );
    assert!(!fs.has_dir(&path));
}
