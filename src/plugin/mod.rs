//! Docker volume plugin adapter.
//!
//! [`VolumePlugin`] maps protocol requests onto [`VolumeManager`] calls and
//! renders results as protocol responses. The HTTP surface lives in
//! [`server`].

use tracing::{error, info};

use crate::driver::StorageDriver;
use crate::fs::FileSystem;
use crate::manager::{VolumeError, VolumeManager};

pub mod server;
mod types;

pub use server::{ListenAddress, PLUGIN_SOCKET_DIR, ServeError, router, serve};
pub use types::{
    ActivateResponse, Capability, CreateRequest, MountRequest, NameRequest, PLUGIN_CONTENT_TYPE,
    VolumeResponse, WireVolume,
};

/// Scope advertised to Docker: volumes are attached to this host only.
pub const VOLUME_SCOPE: &str = "local";

/// Protocol adapter over a [`VolumeManager`].
#[derive(Debug)]
pub struct VolumePlugin<D, F> {
    manager: VolumeManager<D, F>,
}

fn failure(action: &str, name: &str, err: &VolumeError) -> VolumeResponse {
    error!(name, action, kind = %err.kind(), error = %err, "request failed");
    VolumeResponse::error(format!("error {action} volume '{name}': {err}"))
}

impl<D: StorageDriver, F: FileSystem> VolumePlugin<D, F> {
    /// Wraps `manager`.
    #[must_use]
    pub const fn new(manager: VolumeManager<D, F>) -> Self {
        Self { manager }
    }

    /// `/Plugin.Activate`.
    #[must_use]
    pub fn activate(&self) -> ActivateResponse {
        info!("activate");
        ActivateResponse::default()
    }

    /// `/VolumeDriver.Capabilities`.
    #[must_use]
    pub fn capabilities(&self) -> VolumeResponse {
        info!("capabilities");
        VolumeResponse {
            capabilities: Some(Capability {
                scope: VOLUME_SCOPE.to_owned(),
            }),
            ..VolumeResponse::default()
        }
    }

    /// `/VolumeDriver.Create`.
    pub async fn create(&self, request: CreateRequest) -> VolumeResponse {
        let options = request.options.unwrap_or_default();
        info!(name = %request.name, ?options, "create");
        match self.manager.create(&request.name, options).await {
            Ok(_) => VolumeResponse::ok(),
            Err(err) => failure("creating", &request.name, &err),
        }
    }

    /// `/VolumeDriver.Remove`.
    pub async fn remove(&self, request: NameRequest) -> VolumeResponse {
        info!(name = %request.name, "remove");
        match self.manager.remove(&request.name).await {
            Ok(()) => VolumeResponse::ok(),
            Err(err) => failure("removing", &request.name, &err),
        }
    }

    /// `/VolumeDriver.Get`.
    pub async fn get(&self, request: NameRequest) -> VolumeResponse {
        info!(name = %request.name, "get");
        match self.manager.get(&request.name).await {
            Ok(view) => VolumeResponse {
                volume: Some(view.into()),
                ..VolumeResponse::default()
            },
            Err(err) => failure("getting", &request.name, &err),
        }
    }

    /// `/VolumeDriver.List`.
    pub async fn list(&self) -> VolumeResponse {
        let volumes: Vec<WireVolume> = self
            .manager
            .list()
            .await
            .into_iter()
            .map(WireVolume::from)
            .collect();
        info!(count = volumes.len(), "list");
        VolumeResponse {
            volumes: Some(volumes),
            ..VolumeResponse::default()
        }
    }

    /// `/VolumeDriver.Path`.
    pub async fn path(&self, request: NameRequest) -> VolumeResponse {
        info!(name = %request.name, "path");
        match self.manager.get(&request.name).await {
            Ok(view) => VolumeResponse {
                mountpoint: Some(view.mount_path),
                ..VolumeResponse::default()
            },
            Err(err) => failure("getting", &request.name, &err),
        }
    }

    /// `/VolumeDriver.Mount`.
    pub async fn mount(&self, request: MountRequest) -> VolumeResponse {
        info!(name = %request.name, id = %request.id, "mount");
        match self.manager.mount(&request.name).await {
            Ok(path) => VolumeResponse {
                mountpoint: Some(path.into_string()),
                ..VolumeResponse::default()
            },
            Err(err) => failure("mounting", &request.name, &err),
        }
    }

    /// `/VolumeDriver.Unmount`.
    pub async fn unmount(&self, request: MountRequest) -> VolumeResponse {
        info!(name = %request.name, id = %request.id, "unmount");
        match self.manager.unmount(&request.name).await {
            Ok(()) => VolumeResponse::ok(),
            Err(err) => failure("unmounting", &request.name, &err),
        }
    }
}
