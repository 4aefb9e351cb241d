//! Deferred hook cleanup
//!
//! `execute` hands back a cleanup value instead of deleting hook resources
//! inline, so callers can finish their own release bookkeeping between the
//! last readiness watch and teardown. The value is a plain walk plan over
//! hook snapshots plus the collaborators needed to run it; dropping it
//! without calling [`HookCleanup::run`] leaves every hook resource in
//! place.

use std::sync::Arc;

use capstan_errors::Result;
use capstan_events::EventEmitter;
use capstan_release::{HookDeletePolicy, HookOutputLogPolicy};

use crate::ops::{HookOps, HookSnapshot};

enum CleanupWalk {
    /// Every selected hook succeeded; visit them newest-first.
    AllSucceeded { executed: Vec<HookSnapshot> },
    /// A hook failed mid-run; drop it first, then the prior successes
    /// oldest-first.
    Failed {
        failed: HookSnapshot,
        succeeded: Vec<HookSnapshot>,
    },
}

/// Deferred deletion plan returned by [`crate::HookExecutor::execute`].
pub struct HookCleanup {
    inner: Option<(Arc<HookOps>, CleanupWalk)>,
}

impl HookCleanup {
    /// No-op sentinel for runs that applied nothing.
    #[must_use]
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub(crate) fn after_success(ops: Arc<HookOps>, executed: Vec<HookSnapshot>) -> Self {
        Self {
            inner: Some((ops, CleanupWalk::AllSucceeded { executed })),
        }
    }

    pub(crate) fn after_failure(
        ops: Arc<HookOps>,
        failed: HookSnapshot,
        succeeded: Vec<HookSnapshot>,
    ) -> Self {
        Self {
            inner: Some((ops, CleanupWalk::Failed { failed, succeeded })),
        }
    }

    /// Whether running this cleanup can touch the cluster at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Run the deletion walk.
    ///
    /// After a fully successful run the executed hooks are visited in
    /// reverse execution order: logs are surfaced (best-effort) under the
    /// `hook-succeeded` output policy, then the resource is deleted under
    /// the `hook-succeeded` delete policy. After a failed run the failed
    /// hook is deleted under `hook-failed` (best-effort, a warning event
    /// on error), then each previously successful hook is deleted under
    /// `hook-succeeded` in forward order.
    ///
    /// # Errors
    ///
    /// Returns the first hard deletion error; the walk stops there.
    pub async fn run(self) -> Result<()> {
        let Some((ops, walk)) = self.inner else {
            return Ok(());
        };

        match walk {
            CleanupWalk::AllSucceeded { executed } => {
                for hook in executed.iter().rev() {
                    ops.output_logs_best_effort(hook, HookOutputLogPolicy::HookSucceeded)
                        .await;
                    ops.delete_by_policy(hook, HookDeletePolicy::HookSucceeded)
                        .await?;
                }
            }
            CleanupWalk::Failed { failed, succeeded } => {
                if let Err(err) = ops
                    .delete_by_policy(&failed, HookDeletePolicy::HookFailed)
                    .await
                {
                    ops.emit_warning_with_context(
                        format!("unable to delete failed hook {}", failed.path),
                        err.to_string(),
                    );
                }
                for hook in &succeeded {
                    ops.delete_by_policy(hook, HookDeletePolicy::HookSucceeded)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
