use serde::{Deserialize, Serialize};

use capstan_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Optional stable error code once taxonomy lands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

// Declare all domain modules
pub mod deploy;
pub mod general;
pub mod hook;

// Re-export all domain events
pub use deploy::*;
pub use general::*;
pub use hook::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Lifecycle hook execution events
    HookRun(HookRunEvent),

    /// Tiered deployment events (graph, plan, tiers)
    Deploy(DeployEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(
                GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. },
            )
            | Self::HookRun(HookRunEvent::HookFailed { .. })
            | Self::Deploy(DeployEvent::TierFailed { .. }) => Level::ERROR,

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::HookRun(HookRunEvent::LogCollectionFailed { .. }) => Level::WARN,

            // Debug-level events (fine-grained per-resource steps)
            Self::General(GeneralEvent::DebugLog { .. })
            | Self::HookRun(
                HookRunEvent::StaleResourceDeleted { .. } | HookRunEvent::LogsCollected { .. },
            )
            | Self::Deploy(DeployEvent::ChartRendered { .. }) => Level::DEBUG,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "capstan::events::general",
            Self::HookRun(_) => "capstan::events::hooks",
            Self::Deploy(_) => "capstan::events::deploy",
        }
    }

    /// Get structured fields for logging (simplified for now)
    #[must_use]
    pub fn log_fields(&self) -> String {
        format!("{self:?}")
    }
}
