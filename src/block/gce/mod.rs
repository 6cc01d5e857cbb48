//! Google Compute Engine persistent-disk backend.
//!
//! Disks are attached to the instance this process runs on. Project, zone
//! and instance come from explicit settings where given and from the
//! metadata server otherwise.

use std::sync::LazyLock;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

mod metadata;
mod types;

pub use metadata::DEFAULT_METADATA_BASE;

use self::metadata::MetadataClient;
use self::types::{ApiErrorEnvelope, AttachedDiskRequest, Operation};
use super::{BackendError, BlockFuture, OperationBackend, OperationHandle, OperationStatus};

/// Compute Engine REST API root.
pub const DEFAULT_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Settings for [`GceBackend::discover`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GceSettings {
    /// Compute API root, without a trailing slash.
    pub api_base: String,
    /// Metadata server root.
    pub metadata_base: String,
    /// Project override.
    pub project: Option<String>,
    /// Zone override.
    pub zone: Option<String>,
    /// Instance name override.
    pub instance: Option<String>,
    /// Static OAuth bearer token. When unset a token is requested from the
    /// metadata server for every call.
    pub access_token: Option<String>,
}

impl Default for GceSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            metadata_base: DEFAULT_METADATA_BASE.to_owned(),
            project: None,
            zone: None,
            instance: None,
            access_token: None,
        }
    }
}

/// Instance the backend attaches disks to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GceIdentity {
    /// Project identifier.
    pub project: String,
    /// Zone short name, such as `europe-west1-b`.
    pub zone: String,
    /// Instance name.
    pub instance: String,
}

#[derive(Clone, Debug)]
enum Credentials {
    Static(String),
    Metadata(MetadataClient),
}

/// [`OperationBackend`] for Compute Engine `attachDisk` and `detachDisk`.
#[derive(Clone, Debug)]
pub struct GceBackend {
    api_base: String,
    identity: GceIdentity,
    credentials: Credentials,
}

impl GceBackend {
    /// Resolves the instance identity and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] when an identity field is neither
    /// configured nor available from the metadata server, which is the case
    /// when the process is not running on Compute Engine.
    pub async fn discover(settings: GceSettings) -> Result<Self, BackendError> {
        let metadata = MetadataClient::new(&settings.metadata_base);

        let project = resolve(settings.project, "project", metadata.project_id()).await?;
        let zone = resolve(settings.zone, "zone", metadata.zone()).await?;
        let instance = resolve(settings.instance, "instance", metadata.instance_name()).await?;
        let identity = GceIdentity {
            project,
            zone,
            instance,
        };

        let credentials = match settings.access_token {
            Some(token) => {
                info!("GCE: using configured access token");
                Credentials::Static(token)
            }
            None => {
                info!("GCE: using instance default credentials");
                Credentials::Metadata(metadata)
            }
        };

        info!(
            project = %identity.project,
            zone = %identity.zone,
            instance = %identity.instance,
            "GCE: detected instance parameters"
        );

        Ok(Self {
            api_base: settings.api_base.trim_end_matches('/').to_owned(),
            identity,
            credentials,
        })
    }

    /// Returns the instance disks are attached to.
    #[must_use]
    pub const fn identity(&self) -> &GceIdentity {
        &self.identity
    }

    fn zone_url(&self) -> String {
        format!(
            "{}/projects/{}/zones/{}",
            self.api_base, self.identity.project, self.identity.zone
        )
    }

    fn instance_target(&self) -> String {
        format!(
            "projects/{}/zones/{}/instances/{}",
            self.identity.project, self.identity.zone, self.identity.instance
        )
    }

    fn disk_source(&self, volume: &str) -> String {
        format!(
            "projects/{}/zones/{}/disks/{volume}",
            self.identity.project, self.identity.zone
        )
    }

    async fn bearer_token(&self) -> Result<String, BackendError> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Metadata(metadata) => metadata.access_token().await,
        }
    }

    async fn post_instance_action<T: Serialize + Sync>(
        &self,
        action: &str,
        query: &[(&str, &str)],
        body: Option<&T>,
    ) -> Result<OperationHandle, BackendError> {
        let url = format!(
            "{}/instances/{}/{action}",
            self.zone_url(),
            self.identity.instance
        );
        let token = self.bearer_token().await?;

        let mut request = HTTP_CLIENT.post(&url).bearer_auth(token).query(query);
        request = match body {
            Some(payload) => request.json(payload),
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };
        let response = request.send().await?;
        let operation: Operation = decode(response).await?;
        Ok(operation.into_handle(&self.instance_target()))
    }
}

async fn resolve<F>(configured: Option<String>, field: &str, lookup: F) -> Result<String, BackendError>
where
    F: Future<Output = Result<String, BackendError>>,
{
    if let Some(value) = configured.filter(|value| !value.trim().is_empty()) {
        return Ok(value);
    }

    lookup.await.map_err(|err| {
        warn!(field, error = %err, "GCE: not on GCE or can't contact metadata server");
        BackendError::Config(format!(
            "not on GCE or can't contact metadata server: cannot determine {field}: {}",
            err.message()
        ))
    })
}

async fn decode(response: reqwest::Response) -> Result<Operation, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or(body);
        return Err(BackendError::Provider {
            message: format!("{status}: {message}"),
        });
    }

    serde_json::from_str(&body).map_err(|err| BackendError::Provider {
        message: format!("invalid operation response: {err}"),
    })
}

impl OperationBackend for GceBackend {
    fn start_attach<'a>(
        &'a self,
        volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError> {
        Box::pin(async move {
            let body = AttachedDiskRequest {
                source: self.disk_source(volume),
                device_name,
                auto_delete: false,
            };
            self.post_instance_action("attachDisk", &[], Some(&body))
                .await
        })
    }

    fn start_detach<'a>(
        &'a self,
        _volume: &'a str,
        device_name: &'a str,
    ) -> BlockFuture<'a, OperationHandle, BackendError> {
        Box::pin(async move {
            self.post_instance_action::<()>("detachDisk", &[("deviceName", device_name)], None)
                .await
        })
    }

    fn operation_status<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> BlockFuture<'a, OperationStatus, BackendError> {
        Box::pin(async move {
            let url = format!("{}/operations/{}", self.zone_url(), handle.id);
            let token = self.bearer_token().await?;
            let response = HTTP_CLIENT.get(&url).bearer_auth(token).send().await?;
            let operation = decode(response).await?;
            info!(
                project = %self.identity.project,
                zone = %self.identity.zone,
                operation = %operation.name,
                status = %operation.status,
                "GCE: operation status"
            );
            Ok(operation.status())
        })
    }
}
