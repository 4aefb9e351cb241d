//! Dependency-ordered deployment error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum DeployError {
    #[error("dependency cycle detected: {cycle}")]
    DependencyCycle { cycle: String },

    #[error("dependency {name} of {dependent} does not match any sub-chart")]
    UnknownDependency { name: String, dependent: String },

    #[error("failed to render chart {name}: {message}")]
    RenderFailed { name: String, message: String },

    #[error("unable to build kubernetes objects for tier {tier}: {message}")]
    ManifestBuild { tier: usize, message: String },

    #[error("deployment tier {tier} failed: {message}")]
    TierFailed { tier: usize, message: String },
}

impl UserFacingError for DeployError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::DependencyCycle { .. } => {
                Some("Break the cycle by removing one of the depends-on declarations.")
            }
            Self::UnknownDependency { .. } => {
                Some("Declare the sub-chart in the parent chart or fix the depends-on name.")
            }
            Self::RenderFailed { .. } | Self::ManifestBuild { .. } => {
                Some("Fix the chart templates and retry the deployment.")
            }
            Self::TierFailed { .. } => Some(
                "Resources applied by earlier tiers are left in place; inspect them, then retry.",
            ),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::TierFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::DependencyCycle { .. } => "deploy.dependency_cycle",
            Self::UnknownDependency { .. } => "deploy.unknown_dependency",
            Self::RenderFailed { .. } => "deploy.render_failed",
            Self::ManifestBuild { .. } => "deploy.manifest_build",
            Self::TierFailed { .. } => "deploy.tier_failed",
        };
        Some(code)
    }
}
