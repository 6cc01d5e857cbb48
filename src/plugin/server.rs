//! HTTP surface of the plugin: axum routes, Unix socket and TCP listeners.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::{PLUGIN_CONTENT_TYPE, VolumePlugin, VolumeResponse};
use crate::driver::StorageDriver;
use crate::fs::FileSystem;

/// Directory Docker scans for plugin sockets.
pub const PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";

/// Where the plugin accepts connections.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenAddress {
    /// TCP on all interfaces.
    Tcp(SocketAddr),
    /// Unix domain socket.
    Unix(Utf8PathBuf),
}

impl ListenAddress {
    /// TCP when `port` is set and non-zero, otherwise the Unix socket named
    /// by `socket`. A relative socket name resolves to
    /// `/run/docker/plugins/<socket>.sock`.
    #[must_use]
    pub fn resolve(port: Option<u16>, socket: &str) -> Self {
        match port.filter(|port| *port > 0) {
            Some(port) => Self::Tcp(SocketAddr::from(([0, 0, 0, 0], port))),
            None => Self::Unix(socket_path(socket)),
        }
    }
}

fn socket_path(socket: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(socket);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    Utf8Path::new(PLUGIN_SOCKET_DIR).join(format!("{socket}.sock"))
}

/// Errors raised while serving the plugin.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ServeError {
    /// Raised when the socket directory or a stale socket cannot be handled.
    #[error("failed to prepare socket {path}: {message}")]
    Socket {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying error.
        message: String,
    },
    /// Raised when the listener cannot bind.
    #[error("failed to listen on {address}: {message}")]
    Bind {
        /// Rendered listen address.
        address: String,
        /// Underlying error.
        message: String,
    },
    /// Raised when the server stops with an I/O error.
    #[error("plugin server failed: {0}")]
    Serve(String),
}

/// Builds the plugin router.
pub fn router<D, F>(plugin: Arc<VolumePlugin<D, F>>) -> Router
where
    D: StorageDriver + 'static,
    F: FileSystem + 'static,
{
    Router::new()
        .route("/Plugin.Activate", post(activate::<D, F>))
        .route("/VolumeDriver.Capabilities", post(capabilities::<D, F>))
        .route("/VolumeDriver.Create", post(create::<D, F>))
        .route("/VolumeDriver.Remove", post(remove::<D, F>))
        .route("/VolumeDriver.Get", post(get::<D, F>))
        .route("/VolumeDriver.List", post(list::<D, F>))
        .route("/VolumeDriver.Path", post(path::<D, F>))
        .route("/VolumeDriver.Mount", post(mount::<D, F>))
        .route("/VolumeDriver.Unmount", post(unmount::<D, F>))
        .fallback(unknown_route)
        .layer(middleware::from_fn(trace_request))
        .with_state(plugin)
}

/// Serves `router` on `address` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ServeError`] when the listener cannot be set up or the server
/// fails.
pub async fn serve<S>(router: Router, address: &ListenAddress, shutdown: S) -> Result<(), ServeError>
where
    S: Future<Output = ()> + Send + 'static,
{
    match address {
        ListenAddress::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|err| bind_error(addr, &err))?;
            info!(address = %addr, "listening on TCP");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|err| ServeError::Serve(err.to_string()))
        }
        ListenAddress::Unix(path) => {
            prepare_socket(path)?;
            let listener = UnixListener::bind(path).map_err(|err| bind_error(path, &err))?;
            info!(socket = %path, "listening on socket file");
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|err| ServeError::Serve(err.to_string()));
            if let Err(err) = remove_socket(path) {
                warn!(socket = %path, error = %err, "failed to remove socket");
            }
            result
        }
    }
}

fn bind_error(address: &impl ToString, err: &io::Error) -> ServeError {
    ServeError::Bind {
        address: address.to_string(),
        message: err.to_string(),
    }
}

fn socket_error(path: &Utf8Path, err: &io::Error) -> ServeError {
    ServeError::Socket {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn prepare_socket(path: &Utf8Path) -> Result<(), ServeError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| socket_error(parent, &err))?;
    }
    remove_socket(path)
}

fn remove_socket(path: &Utf8Path) -> Result<(), ServeError> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(());
    };
    let dir_path = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    let dir = Dir::open_ambient_dir(dir_path, ambient_authority())
        .map_err(|err| socket_error(dir_path, &err))?;
    match dir.remove_file(name) {
        Ok(()) => {
            info!(socket = %path, "removed stale socket");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(socket_error(path, &err)),
    }
}

async fn trace_request(request: Request, next: Next) -> Response {
    let span = info_span!(
        "plugin_request",
        request_id = %Uuid::new_v4(),
        route = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

fn respond<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], bytes).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn volume_response(response: &VolumeResponse) -> Response {
    let status = if response.is_err() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    respond(status, response)
}

async fn with_request<T, C, Fut>(body: &Bytes, call: C) -> Response
where
    T: DeserializeOwned,
    C: FnOnce(T) -> Fut,
    Fut: Future<Output = VolumeResponse>,
{
    match serde_json::from_slice::<T>(body) {
        Ok(request) => volume_response(&call(request).await),
        Err(err) => {
            warn!(error = %err, "malformed request body");
            respond(
                StatusCode::BAD_REQUEST,
                &VolumeResponse::error(format!("malformed request: {err}")),
            )
        }
    }
}

type PluginState<D, F> = State<Arc<VolumePlugin<D, F>>>;

async fn activate<D: StorageDriver, F: FileSystem>(State(plugin): PluginState<D, F>) -> Response {
    respond(StatusCode::OK, &plugin.activate())
}

async fn capabilities<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
) -> Response {
    volume_response(&plugin.capabilities())
}

async fn create<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.create(request)).await
}

async fn remove<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.remove(request)).await
}

async fn get<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.get(request)).await
}

async fn list<D: StorageDriver, F: FileSystem>(State(plugin): PluginState<D, F>) -> Response {
    volume_response(&plugin.list().await)
}

async fn path<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.path(request)).await
}

async fn mount<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.mount(request)).await
}

async fn unmount<D: StorageDriver, F: FileSystem>(
    State(plugin): PluginState<D, F>,
    body: Bytes,
) -> Response {
    with_request(&body, |request| plugin.unmount(request)).await
}

async fn unknown_route(request: Request) -> Response {
    warn!(route = %request.uri().path(), "unknown plugin route");
    respond(
        StatusCode::NOT_FOUND,
        &VolumeResponse::error(format!("unknown route {}", request.uri().path())),
    )
}
