//! Release schema and accessor error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ReleaseError {
    #[error("unsupported release schema version")]
    UnsupportedSchema,

    #[error("unsupported hook schema version")]
    UnsupportedHookSchema,

    #[error("release store rejected {name}: {message}")]
    StoreFailed { name: String, message: String },
}

impl UserFacingError for ReleaseError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedSchema | Self::UnsupportedHookSchema => {
                Some("Upgrade capstan; this release was written by a newer schema.")
            }
            Self::StoreFailed { .. } => {
                Some("Check connectivity to the release storage backend and retry.")
            }
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnsupportedSchema => "release.unsupported_schema",
            Self::UnsupportedHookSchema => "release.unsupported_hook_schema",
            Self::StoreFailed { .. } => "release.store_failed",
        };
        Some(code)
    }
}
