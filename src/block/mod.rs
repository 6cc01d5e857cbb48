//! Block storage port: attach a durable disk to this host and detach it.
//!
//! Providers expose attach and detach as asynchronous operations. An
//! [`OperationBackend`] issues the request and reports operation status;
//! [`PollingBlockStorage`] drives the operation to completion under a fixed
//! poll interval and deadline and resolves the device path from the
//! [`DeviceNaming`] convention.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use camino::Utf8PathBuf;

mod error;
pub mod gce;
mod naming;
mod wait;

pub use error::{BackendError, BlockStorageError};
pub use naming::{DEVICE_NAME_PREFIX, DeviceNaming, GCE_DEVICE_PATH_PREFIX};
pub use wait::PollingBlockStorage;

/// Default delay between operation status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default deadline for an attach or detach operation.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Future returned by block storage and operation backend calls.
pub type BlockFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Attach and detach of durable volumes on the current host.
pub trait BlockStorage: Send + Sync {
    /// Attaches `volume` to this host and returns the device path.
    fn attach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, Utf8PathBuf, BlockStorageError>;

    /// Detaches `volume` from this host.
    fn detach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, (), BlockStorageError>;
}

/// In-flight provider operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationHandle {
    /// Opaque identifier used to query the operation.
    pub id: String,
    /// Human-readable reference to the affected resource.
    pub target: String,
}

/// Status reported for an [`OperationHandle`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationStatus {
    /// Still running; carries the raw provider status for logging.
    Pending(String),
    /// Completed successfully.
    Done,
    /// Completed with a provider-reported failure.
    Failed(String),
}

/// Provider operations consumed by [`PollingBlockStorage`].
pub trait OperationBackend: Send + Sync {
    /// Requests attachment of the disk backing `volume` as `device_name`.
    fn start_attach<'a>(
        &'a self,
        volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError>;

    /// Requests detachment of the device `device_name`.
    fn start_detach<'a>(
        &'a self,
        volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError>;

    /// Queries the current status of an operation.
    fn operation_status<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> BlockFuture<'a, OperationStatus, BackendError>;
}

/// Poll cadence for provider operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Delay between status queries.
    pub interval: Duration,
    /// Deadline measured from the first status query.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}
