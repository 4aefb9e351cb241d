//! Lifecycle hook execution error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum HookError {
    #[error("unable to build kubernetes objects for applying {event} hook {path}: {message}")]
    ManifestBuild {
        event: String,
        path: String,
        message: String,
    },

    #[error("{event} hook {path} failed to apply: {message}")]
    CreateFailed {
        event: String,
        path: String,
        message: String,
    },

    #[error("{event} hook {path} did not become ready: {message}")]
    NotReady {
        event: String,
        path: String,
        message: String,
    },

    #[error("unable to delete hook {path}: {message}")]
    CleanupFailed { path: String, message: String },

    #[error("unable to parse manifest of hook {path}: {message}")]
    ManifestParse { path: String, message: String },

    #[error("unable to collect logs for hook {name}: {message}")]
    LogCollection { name: String, message: String },
}

impl UserFacingError for HookError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ManifestBuild { .. } | Self::ManifestParse { .. } => {
                Some("Fix the hook manifest in the chart and retry the operation.")
            }
            Self::CreateFailed { .. } => {
                Some("Inspect cluster events for the hook resource, then retry.")
            }
            Self::NotReady { .. } => Some(
                "Check the hook workload's logs; raise the timeout if it simply needs more time.",
            ),
            Self::CleanupFailed { .. } => {
                Some("Delete the leftover hook resource manually before the next run.")
            }
            Self::LogCollection { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed { .. } | Self::NotReady { .. } | Self::LogCollection { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ManifestBuild { .. } => "hook.manifest_build",
            Self::CreateFailed { .. } => "hook.create_failed",
            Self::NotReady { .. } => "hook.not_ready",
            Self::CleanupFailed { .. } => "hook.cleanup_failed",
            Self::ManifestParse { .. } => "hook.manifest_parse",
            Self::LogCollection { .. } => "hook.log_collection",
        };
        Some(code)
    }
}
