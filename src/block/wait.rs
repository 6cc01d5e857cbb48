//! Operation-completion polling shared by every operation backend.

use camino::Utf8PathBuf;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use super::{
    BackendError, BlockFuture, BlockStorage, BlockStorageError, DeviceNaming, OperationBackend,
    OperationHandle, OperationStatus, PollSettings,
};

#[derive(Copy, Clone, Debug)]
enum OperationKind {
    Attach,
    Detach,
}

impl OperationKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::Detach => "detach",
        }
    }

    const fn into_error(self, volume: String, message: String) -> BlockStorageError {
        match self {
            Self::Attach => BlockStorageError::Attach { volume, message },
            Self::Detach => BlockStorageError::Detach { volume, message },
        }
    }
}

/// [`BlockStorage`] that issues provider operations and polls them to a
/// terminal state.
#[derive(Clone, Debug)]
pub struct PollingBlockStorage<B> {
    backend: B,
    naming: DeviceNaming,
    settings: PollSettings,
}

impl<B: OperationBackend> PollingBlockStorage<B> {
    /// Wraps `backend` with the given naming convention and poll cadence.
    #[must_use]
    pub const fn new(backend: B, naming: DeviceNaming, settings: PollSettings) -> Self {
        Self {
            backend,
            naming,
            settings,
        }
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    async fn wait_for_operation(
        &self,
        kind: OperationKind,
        volume: &str,
        handle: &OperationHandle,
    ) -> Result<(), BlockStorageError> {
        let deadline = Instant::now() + self.settings.timeout;

        while Instant::now() < deadline {
            let Ok(polled) = timeout_at(deadline, self.backend.operation_status(handle)).await
            else {
                debug!(operation = %handle.id, "status query outlived the deadline");
                break;
            };
            match polled {
                Ok(OperationStatus::Done) => {
                    debug!(operation = %handle.id, target = %handle.target, "operation done");
                    return Ok(());
                }
                Ok(OperationStatus::Failed(message)) => {
                    warn!(
                        operation = %handle.id,
                        target = %handle.target,
                        %message,
                        "operation failed"
                    );
                    return Err(kind.into_error(volume.to_owned(), message));
                }
                Ok(OperationStatus::Pending(status)) => {
                    debug!(operation = %handle.id, %status, "waiting for operation");
                }
                Err(err) => {
                    warn!(
                        operation = %handle.id,
                        target = %handle.target,
                        error = %err,
                        "error while getting operation status"
                    );
                }
            }
            sleep_until((Instant::now() + self.settings.interval).min(deadline)).await;
        }

        warn!(
            operation = %handle.id,
            target = %handle.target,
            timeout = ?self.settings.timeout,
            "timeout while waiting for operation to complete"
        );
        Err(BlockStorageError::Timeout {
            operation: handle.id.clone(),
            target: handle.target.clone(),
            timeout: self.settings.timeout,
        })
    }

    fn start_failed(kind: OperationKind, volume: &str, err: &BackendError) -> BlockStorageError {
        warn!(volume, action = kind.as_str(), error = %err, "backend rejected request");
        kind.into_error(volume.to_owned(), err.message().to_owned())
    }
}

impl<B: OperationBackend> BlockStorage for PollingBlockStorage<B> {
    fn attach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, Utf8PathBuf, BlockStorageError> {
        Box::pin(async move {
            let device_name = self.naming.device_name(volume);
            info!(volume, device = %device_name, "attach disk");

            let handle = self
                .backend
                .start_attach(volume, &device_name)
                .await
                .map_err(|err| Self::start_failed(OperationKind::Attach, volume, &err))?;
            self.wait_for_operation(OperationKind::Attach, volume, &handle)
                .await?;

            let device_path = self.naming.device_path(&device_name);
            info!(volume, device_path = %device_path, "attached device");
            Ok(device_path)
        })
    }

    fn detach<'a>(&'a self, volume: &'a str) -> BlockFuture<'a, (), BlockStorageError> {
        Box::pin(async move {
            let device_name = self.naming.device_name(volume);
            info!(volume, device = %device_name, "detach disk");

            let handle = self
                .backend
                .start_detach(volume, &device_name)
                .await
                .map_err(|err| Self::start_failed(OperationKind::Detach, volume, &err))?;
            self.wait_for_operation(OperationKind::Detach, volume, &handle)
                .await?;

            info!(volume, "detached device");
            Ok(())
        })
    }
}
