//! Compute Engine REST payloads.

use serde::{Deserialize, Serialize};

use crate::block::{OperationHandle, OperationStatus};

const STATUS_DONE: &str = "DONE";

/// Body of `instances.attachDisk`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttachedDiskRequest<'a> {
    pub(super) source: String,
    pub(super) device_name: &'a str,
    pub(super) auto_delete: bool,
}

/// Zone operation resource as returned by attach, detach and polling calls.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Operation {
    pub(super) name: String,
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) target_link: Option<String>,
    #[serde(default)]
    pub(super) error: Option<OperationErrors>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(super) struct OperationErrors {
    #[serde(default)]
    pub(super) errors: Vec<OperationErrorItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(super) struct OperationErrorItem {
    #[serde(default)]
    pub(super) code: String,
    #[serde(default)]
    pub(super) message: String,
}

impl Operation {
    pub(super) fn status(&self) -> OperationStatus {
        if self.status != STATUS_DONE {
            return OperationStatus::Pending(self.status.clone());
        }

        match self.error.as_ref().filter(|errors| !errors.errors.is_empty()) {
            Some(errors) => OperationStatus::Failed(errors.describe()),
            None => OperationStatus::Done,
        }
    }

    pub(super) fn into_handle(self, fallback_target: &str) -> OperationHandle {
        OperationHandle {
            id: self.name,
            target: self
                .target_link
                .filter(|link| !link.is_empty())
                .unwrap_or_else(|| fallback_target.to_owned()),
        }
    }
}

impl OperationErrors {
    fn describe(&self) -> String {
        self.errors
            .iter()
            .map(|item| match (item.code.is_empty(), item.message.is_empty()) {
                (false, false) => format!("{}: {}", item.code, item.message),
                (true, _) => item.message.clone(),
                (false, true) => item.code.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Error envelope returned by Google APIs on non-2xx responses.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct ApiErrorEnvelope {
    pub(super) error: ApiError,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ApiError {
    #[serde(default)]
    pub(super) message: String,
}

/// Token issued by the metadata server for the default service account.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct MetadataToken {
    pub(super) access_token: String,
}
