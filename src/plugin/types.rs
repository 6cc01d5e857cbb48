//! Docker volume plugin protocol payloads.

use serde::{Deserialize, Serialize};

use crate::volume::{VolumeOptions, VolumeView};

/// Media type used by Docker for plugin requests and responses.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Body of `/VolumeDriver.Create`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct CreateRequest {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Driver options from `docker volume create -o`.
    #[serde(rename = "Opts", default)]
    pub options: Option<VolumeOptions>,
}

/// Body of `/VolumeDriver.Remove`, `/VolumeDriver.Get` and
/// `/VolumeDriver.Path`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct NameRequest {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
}

/// Body of `/VolumeDriver.Mount` and `/VolumeDriver.Unmount`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct MountRequest {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Identifier of the container using the volume.
    #[serde(rename = "ID", default)]
    pub id: String,
}

/// Volume as rendered in `Get` and `List` responses.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WireVolume {
    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Mount directory; omitted while unmounted.
    #[serde(rename = "Mountpoint", default, skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
}

impl From<VolumeView> for WireVolume {
    fn from(view: VolumeView) -> Self {
        Self {
            name: view.name,
            mountpoint: view.mount_path,
        }
    }
}

/// Scope reported by `/VolumeDriver.Capabilities`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Capability {
    /// `local` or `global`.
    #[serde(rename = "Scope")]
    pub scope: String,
}

/// Response envelope shared by every `VolumeDriver` endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VolumeResponse {
    /// Error message; set only on failure.
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// Mount directory for `Path` and `Mount`.
    #[serde(rename = "Mountpoint", default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    /// Volume for `Get`.
    #[serde(rename = "Volume", default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<WireVolume>,
    /// Volumes for `List`.
    #[serde(rename = "Volumes", default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<WireVolume>>,
    /// Capabilities for `Capabilities`.
    #[serde(rename = "Capabilities", default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capability>,
}

impl VolumeResponse {
    /// Empty success response.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Failure response carrying `message`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether the response reports a failure.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

/// Response of `/Plugin.Activate`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActivateResponse {
    /// Implemented plugin subsystems.
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec![String::from("VolumeDriver")],
        }
    }
}
