//! Test support utilities shared across unit and integration tests.
//!
//! The doubles record their calls in a shared [`CallLog`] so tests can assert
//! the order of attach, mount, unmount and detach across ports.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::block::{
    BackendError, BlockFuture, BlockStorage, BlockStorageError, DeviceNaming, OperationBackend,
    OperationHandle, OperationStatus,
};
use crate::fs::{CommandOutput, CommandRunner, FileSystem, FsError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, FsError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| FsError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Ordered record of calls made across test doubles.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Appends a call description.
    pub fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }

    /// Returns a snapshot of the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Counts recorded calls starting with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[derive(Debug, Default)]
struct FsState {
    dirs: BTreeSet<Utf8PathBuf>,
    fail_dir_exists: Option<String>,
    fail_create_dir: Option<String>,
    fail_remove_dir: Option<String>,
    fail_mount: Option<String>,
    fail_unmount: Option<String>,
}

/// In-memory [`FileSystem`] that tracks directories and records mounts.
#[derive(Clone, Debug, Default)]
pub struct RecordingFileSystem {
    log: CallLog,
    state: Arc<Mutex<FsState>>,
}

impl RecordingFileSystem {
    /// Creates a filesystem that records into `log`.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: Arc::default(),
        }
    }

    /// Whether `path` is currently a known directory.
    #[must_use]
    pub fn has_dir(&self, path: &Utf8Path) -> bool {
        lock(&self.state).dirs.contains(path)
    }

    /// Fails every `dir_exists` call with `message`.
    pub fn fail_dir_exists(&self, message: &str) {
        lock(&self.state).fail_dir_exists = Some(message.to_owned());
    }

    /// Fails every `create_dir` call with `message`.
    pub fn fail_create_dir(&self, message: &str) {
        lock(&self.state).fail_create_dir = Some(message.to_owned());
    }

    /// Fails every `remove_dir` call with `message`.
    pub fn fail_remove_dir(&self, message: &str) {
        lock(&self.state).fail_remove_dir = Some(message.to_owned());
    }

    /// Fails every `mount` call with `message`.
    pub fn fail_mount(&self, message: &str) {
        lock(&self.state).fail_mount = Some(message.to_owned());
    }

    /// Fails every `unmount` call with `message`.
    pub fn fail_unmount(&self, message: &str) {
        lock(&self.state).fail_unmount = Some(message.to_owned());
    }

    /// Clears every configured failure.
    pub fn heal(&self) {
        let mut state = lock(&self.state);
        state.fail_dir_exists = None;
        state.fail_create_dir = None;
        state.fail_remove_dir = None;
        state.fail_mount = None;
        state.fail_unmount = None;
    }
}

fn io_failure(path: &Utf8Path, message: &str) -> FsError {
    FsError::Io {
        path: path.to_path_buf(),
        message: message.to_owned(),
    }
}

fn command_failure(command: String, message: &str) -> FsError {
    FsError::Command {
        command,
        status: Some(32),
        status_text: String::from("32"),
        output: message.to_owned(),
    }
}

impl FileSystem for RecordingFileSystem {
    fn dir_exists(&self, path: &Utf8Path) -> Result<bool, FsError> {
        let state = lock(&self.state);
        if let Some(message) = &state.fail_dir_exists {
            return Err(io_failure(path, message));
        }
        Ok(state.dirs.contains(path))
    }

    fn create_dir(&self, path: &Utf8Path, recursive: bool, mode: u32) -> Result<(), FsError> {
        self.log.record(format!("create_dir {path} {mode:o}"));
        let mut state = lock(&self.state);
        if let Some(message) = &state.fail_create_dir {
            return Err(io_failure(path, message));
        }
        if !recursive {
            let parent_known = path
                .parent()
                .is_none_or(|parent| state.dirs.contains(parent));
            if !parent_known {
                return Err(io_failure(path, "parent directory does not exist"));
            }
        }
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_dir(&self, path: &Utf8Path, _recursive: bool) -> Result<(), FsError> {
        self.log.record(format!("remove_dir {path}"));
        let mut state = lock(&self.state);
        if let Some(message) = &state.fail_remove_dir {
            return Err(io_failure(path, message));
        }
        if !state.dirs.remove(path) {
            return Err(io_failure(path, "no such directory"));
        }
        Ok(())
    }

    fn mount(&self, device: &Utf8Path, target: &Utf8Path) -> Result<(), FsError> {
        let command = format!("mount {device} {target}");
        self.log.record(command.clone());
        match &lock(&self.state).fail_mount {
            Some(message) => Err(command_failure(command, message)),
            None => Ok(()),
        }
    }

    fn unmount(&self, target: &Utf8Path) -> Result<(), FsError> {
        let command = format!("unmount {target}");
        self.log.record(command.clone());
        match &lock(&self.state).fail_unmount {
            Some(message) => Err(command_failure(command, message)),
            None => Ok(()),
        }
    }

    fn format(&self, device: &Utf8Path) -> Result<(), FsError> {
        self.log.record(format!("format {device}"));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BlockState {
    fail_attach: Option<String>,
    fail_detach: Option<String>,
    timeout_attach: bool,
}

/// [`BlockStorage`] double with scripted failures.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBlockStorage {
    log: CallLog,
    naming: DeviceNaming,
    state: Arc<Mutex<BlockState>>,
}

impl ScriptedBlockStorage {
    /// Creates block storage that records into `log` and uses GCE naming.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            naming: DeviceNaming::gce(),
            state: Arc::default(),
        }
    }

    /// Rejects attach requests with `message`.
    pub fn fail_attach(&self, message: &str) {
        lock(&self.state).fail_attach = Some(message.to_owned());
    }

    /// Rejects detach requests with `message`.
    pub fn fail_detach(&self, message: &str) {
        lock(&self.state).fail_detach = Some(message.to_owned());
    }

    /// Makes attach operations miss their deadline.
    pub fn timeout_attach(&self) {
        lock(&self.state).timeout_attach = true;
    }
}

impl BlockStorage for ScriptedBlockStorage {
    fn attach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, Utf8PathBuf, BlockStorageError> {
        Box::pin(async move {
            self.log.record(format!("attach {volume}"));
            let device_name = self.naming.device_name(volume);
            let state = lock(&self.state);
            if state.timeout_attach {
                return Err(BlockStorageError::Timeout {
                    operation: format!("op-attach-{device_name}"),
                    target: format!("disk/{device_name}"),
                    timeout: crate::block::DEFAULT_WAIT_TIMEOUT,
                });
            }
            if let Some(message) = &state.fail_attach {
                return Err(BlockStorageError::Attach {
                    volume: volume.to_owned(),
                    message: message.clone(),
                });
            }
            Ok(self.naming.device_path(&device_name))
        })
    }

    fn detach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, (), BlockStorageError> {
        Box::pin(async move {
            self.log.record(format!("detach {volume}"));
            match &lock(&self.state).fail_detach {
                Some(message) => Err(BlockStorageError::Detach {
                    volume: volume.to_owned(),
                    message: message.clone(),
                }),
                None => Ok(()),
            }
        })
    }
}

#[derive(Debug, Default)]
struct OperationState {
    statuses: VecDeque<Result<OperationStatus, BackendError>>,
    started: Vec<String>,
    status_calls: usize,
    fail_start: Option<String>,
    status_delay: Option<Duration>,
}

/// [`OperationBackend`] that replays queued statuses.
///
/// Once the queue is empty every poll reports `RUNNING`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedOperationBackend {
    state: Arc<Mutex<OperationState>>,
}

impl ScriptedOperationBackend {
    /// Creates a backend with an empty status queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next status poll.
    pub fn push_status(&self, status: Result<OperationStatus, BackendError>) {
        lock(&self.state).statuses.push_back(status);
    }

    /// Rejects every start request with `message`.
    pub fn fail_start(&self, message: &str) {
        lock(&self.state).fail_start = Some(message.to_owned());
    }

    /// Delays every status poll by `delay` before answering.
    pub fn stall_status(&self, delay: Duration) {
        lock(&self.state).status_delay = Some(delay);
    }

    /// Start requests issued so far, as `attach:<device>` or `detach:<device>`.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        lock(&self.state).started.clone()
    }

    /// Number of status polls made so far.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        lock(&self.state).status_calls
    }

    fn start(&self, action: &str, device_name: &str) -> Result<OperationHandle, BackendError> {
        let mut state = lock(&self.state);
        state.started.push(format!("{action}:{device_name}"));
        if let Some(message) = &state.fail_start {
            return Err(BackendError::Provider {
                message: message.clone(),
            });
        }
        Ok(OperationHandle {
            id: format!("op-{action}-{device_name}"),
            target: format!("disk/{device_name}"),
        })
    }
}

impl OperationBackend for ScriptedOperationBackend {
    fn start_attach<'a>(
        &'a self,
        _volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError> {
        Box::pin(async move { self.start("attach", device_name) })
    }

    fn start_detach<'a>(
        &'a self,
        _volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError> {
        Box::pin(async move { self.start("detach", device_name) })
    }

    fn operation_status<'a>(
        &'a self,
        _handle: &'a OperationHandle,
    ) -> BlockFuture<'a, OperationStatus, BackendError> {
        Box::pin(async move {
            let (delay, status) = {
                let mut state = lock(&self.state);
                state.status_calls += 1;
                let next = state
                    .statuses
                    .pop_front()
                    .unwrap_or_else(|| Ok(OperationStatus::Pending(String::from("RUNNING"))));
                (state.status_delay, next)
            };
            if let Some(pause) = delay {
                tokio::time::sleep(pause).await;
            }
            status
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
