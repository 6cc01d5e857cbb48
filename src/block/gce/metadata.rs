//! Compute Engine metadata server client used for instance discovery and
//! default service-account credentials.

use std::time::Duration;

use tracing::debug;

use super::HTTP_CLIENT;
use super::types::MetadataToken;
use crate::block::BackendError;

/// Root of the metadata server API.
pub const DEFAULT_METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub(super) struct MetadataClient {
    base: String,
}

impl MetadataClient {
    pub(super) fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    pub(super) async fn project_id(&self) -> Result<String, BackendError> {
        self.get_text("project/project-id").await
    }

    /// Zone short name; the server answers with `projects/<n>/zones/<zone>`.
    pub(super) async fn zone(&self) -> Result<String, BackendError> {
        let full = self.get_text("instance/zone").await?;
        Ok(last_segment(&full).to_owned())
    }

    pub(super) async fn instance_name(&self) -> Result<String, BackendError> {
        self.get_text("instance/name").await
    }

    pub(super) async fn access_token(&self) -> Result<String, BackendError> {
        let body = self
            .get_text("instance/service-accounts/default/token")
            .await?;
        let token: MetadataToken =
            serde_json::from_str(&body).map_err(|err| BackendError::Provider {
                message: format!("invalid metadata token response: {err}"),
            })?;
        Ok(token.access_token)
    }

    async fn get_text(&self, path: &str) -> Result<String, BackendError> {
        let url = format!("{}/{path}", self.base);
        debug!(%url, "query metadata server");

        let response = HTTP_CLIENT
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Provider {
                message: format!("metadata server returned {status} for {path}: {body}"),
            });
        }
        Ok(body.trim().to_owned())
    }
}

fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}
