use serde::{Deserialize, Serialize};

/// Lifecycle hook execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HookRunEvent {
    /// Hook run started for a lifecycle event after selection and ordering
    Started { event: String, hooks: usize },

    /// A single hook is about to be applied to the cluster
    HookStarted {
        event: String,
        name: String,
        path: String,
        weight: i32,
    },

    /// A single hook reached ready state
    HookSucceeded {
        event: String,
        name: String,
        path: String,
    },

    /// A single hook failed to apply or become ready
    HookFailed {
        event: String,
        name: String,
        path: String,
        failure: super::FailureContext,
    },

    /// A hook resource was deleted under the named delete policy
    StaleResourceDeleted {
        name: String,
        path: String,
        policy: String,
    },

    /// Pod logs were collected for a hook
    LogsCollected { name: String, pods: usize },

    /// Best-effort log collection failed; the run continues
    LogCollectionFailed {
        name: String,
        failure: super::FailureContext,
    },

    /// All selected hooks reached ready state
    Completed { event: String, executed: usize },
}

impl HookRunEvent {
    /// Create a started event
    pub fn started(event: impl Into<String>, hooks: usize) -> Self {
        Self::Started {
            event: event.into(),
            hooks,
        }
    }

    /// Create a hook failed event
    pub fn hook_failed(
        event: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        failure: super::FailureContext,
    ) -> Self {
        Self::HookFailed {
            event: event.into(),
            name: name.into(),
            path: path.into(),
            failure,
        }
    }

    /// Create a completed event
    pub fn completed(event: impl Into<String>, executed: usize) -> Self {
        Self::Completed {
            event: event.into(),
            executed,
        }
    }
}
