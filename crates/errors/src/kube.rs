//! Cluster client error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum KubeError {
    #[error("failed to parse resource manifest: {message}")]
    ManifestParse { message: String },

    #[error("failed to create resource {name}: {message}")]
    CreateFailed { name: String, message: String },

    #[error("failed to delete resource {name}: {message}")]
    DeleteFailed { name: String, message: String },

    #[error("resources failed to reach ready state: {message}")]
    ReadinessFailed { message: String },

    #[error("resources were not deleted in time: {message}")]
    DeleteWaitFailed { message: String },

    #[error("failed to list pods for selector {selector}: {message}")]
    PodListFailed { selector: String, message: String },

    #[error("failed to fetch logs for pod {pod}: {message}")]
    PodLogsFailed { pod: String, message: String },
}

impl UserFacingError for KubeError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ManifestParse { .. } => {
                Some("The manifest is not valid YAML for a cluster resource; fix it and retry.")
            }
            Self::ReadinessFailed { .. } => {
                Some("Inspect the resource's status conditions; raise the timeout if needed.")
            }
            Self::DeleteWaitFailed { .. } => {
                Some("Finalizers may be blocking deletion; inspect the stuck resources.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed { .. }
                | Self::DeleteFailed { .. }
                | Self::PodListFailed { .. }
                | Self::PodLogsFailed { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ManifestParse { .. } => "kube.manifest_parse",
            Self::CreateFailed { .. } => "kube.create_failed",
            Self::DeleteFailed { .. } => "kube.delete_failed",
            Self::ReadinessFailed { .. } => "kube.readiness_failed",
            Self::DeleteWaitFailed { .. } => "kube.delete_wait_failed",
            Self::PodListFailed { .. } => "kube.pod_list_failed",
            Self::PodLogsFailed { .. } => "kube.pod_logs_failed",
        };
        Some(code)
    }
}
