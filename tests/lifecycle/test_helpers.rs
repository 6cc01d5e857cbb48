//! Shared fixtures for lifecycle BDD scenarios.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use cloudvol::test_support::{CallLog, RecordingFileSystem, ScriptedBlockStorage};
use cloudvol::{BlockDeviceStorage, ErrorKind, VolumeManager};
use rstest::fixture;

pub type LifecycleManager = VolumeManager<
    BlockDeviceStorage<ScriptedBlockStorage, RecordingFileSystem>,
    RecordingFileSystem,
>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    Mounted(Utf8PathBuf),
    Failure { kind: ErrorKind, message: String },
}

#[derive(Debug)]
pub struct LifecycleContext {
    pub log: CallLog,
    pub block: ScriptedBlockStorage,
    pub fs: RecordingFileSystem,
    pub manager: RefCell<Option<LifecycleManager>>,
    pub outcome: RefCell<Option<Outcome>>,
}

impl LifecycleContext {
    pub fn record(&self, outcome: Outcome) {
        self.outcome.replace(Some(outcome));
    }
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    let log = CallLog::default();
    LifecycleContext {
        block: ScriptedBlockStorage::new(log.clone()),
        fs: RecordingFileSystem::new(log.clone()),
        log,
        manager: RefCell::new(None),
        outcome: RefCell::new(None),
    }
}
