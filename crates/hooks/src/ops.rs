//! Shared hook resource operations
//!
//! Deletion by policy and log surfacing are needed both while a hook run
//! is in flight and later by the deferred cleanup, so they live on one
//! value the cleanup can carry off after `execute` returns.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;

use capstan_errors::{Error, HookError, Result};
use capstan_events::{AppEvent, EventEmitter, EventSender, FailureContext, HookRunEvent};
use capstan_kube::{LogSink, PodSelector, PropagationPolicy, ResourceClient, WaitStrategy};
use capstan_release::{HookAccessor, HookDeletePolicy, HookOutputLogPolicy};

/// Log destination shared between the executor and its deferred cleanups.
pub type SharedLogSink = Arc<Mutex<Box<dyn LogSink>>>;

/// Point-in-time copy of one hook record, taken after policy defaulting.
///
/// The deferred cleanup outlives the engine's borrow of the release
/// snapshot, so it operates on these copies instead of accessor handles.
#[derive(Debug, Clone)]
pub(crate) struct HookSnapshot {
    pub name: String,
    pub path: String,
    pub kind: String,
    pub manifest: String,
    delete_before_creation: bool,
    delete_on_success: bool,
    delete_on_failure: bool,
    logs_on_success: bool,
    logs_on_failure: bool,
}

impl HookSnapshot {
    pub fn capture(hook: &dyn HookAccessor) -> Self {
        Self {
            name: hook.name().to_string(),
            path: hook.path().to_string(),
            kind: hook.kind().to_string(),
            manifest: hook.manifest().to_string(),
            delete_before_creation: hook.has_delete_policy(HookDeletePolicy::BeforeHookCreation),
            delete_on_success: hook.has_delete_policy(HookDeletePolicy::HookSucceeded),
            delete_on_failure: hook.has_delete_policy(HookDeletePolicy::HookFailed),
            logs_on_success: hook.has_output_log_policy(HookOutputLogPolicy::HookSucceeded),
            logs_on_failure: hook.has_output_log_policy(HookOutputLogPolicy::HookFailed),
        }
    }

    fn has_delete_policy(&self, policy: HookDeletePolicy) -> bool {
        match policy {
            HookDeletePolicy::BeforeHookCreation => self.delete_before_creation,
            HookDeletePolicy::HookSucceeded => self.delete_on_success,
            HookDeletePolicy::HookFailed => self.delete_on_failure,
        }
    }

    fn has_output_log_policy(&self, policy: HookOutputLogPolicy) -> bool {
        match policy {
            HookOutputLogPolicy::HookSucceeded => self.logs_on_success,
            HookOutputLogPolicy::HookFailed => self.logs_on_failure,
        }
    }
}

/// Collaborators for one execution pass, shared with its cleanup.
pub(crate) struct HookOps {
    pub client: Arc<dyn ResourceClient>,
    pub wait_strategy: WaitStrategy,
    pub timeout: Duration,
    pub release_namespace: String,
    pub log_sink: SharedLogSink,
    pub events: Option<EventSender>,
}

impl EventEmitter for HookOps {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl HookOps {
    /// Delete the hook's resource if the given policy is set on it.
    ///
    /// Resources of kind `CustomResourceDefinition` are never deleted:
    /// removing the definition cascades to every object of that kind.
    /// Deletion waits for the resource to be gone so a re-create of the
    /// same name cannot race the terminating one.
    pub async fn delete_by_policy(
        &self,
        hook: &HookSnapshot,
        policy: HookDeletePolicy,
    ) -> Result<()> {
        if hook.kind == "CustomResourceDefinition" || !hook.has_delete_policy(policy) {
            return Ok(());
        }

        let resources = self.client.build(&hook.manifest, false).map_err(|err| {
            Error::from(HookError::CleanupFailed {
                path: hook.path.clone(),
                message: err.to_string(),
            })
        })?;
        if resources.is_empty() {
            return Ok(());
        }

        let errors = self
            .client
            .delete(&resources, PropagationPolicy::Background)
            .await;
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(HookError::CleanupFailed {
                path: hook.path.clone(),
                message,
            }
            .into());
        }

        let waiter = self.client.waiter(self.wait_strategy)?;
        waiter.wait_for_delete(&resources, self.timeout).await?;

        self.emit(AppEvent::HookRun(HookRunEvent::StaleResourceDeleted {
            name: hook.name.clone(),
            path: hook.path.clone(),
            policy: policy.to_string(),
        }));
        Ok(())
    }

    /// Surface the hook workload's pod logs if the given policy is set.
    ///
    /// Only `Job` hooks (pods matched by the `job-name` label) and `Pod`
    /// hooks (matched by name) carry logs; other kinds are a no-op.
    pub async fn output_logs_by_policy(
        &self,
        hook: &HookSnapshot,
        policy: HookOutputLogPolicy,
    ) -> Result<()> {
        if !hook.has_output_log_policy(policy) {
            return Ok(());
        }

        let selector = match hook.kind.as_str() {
            "Job" => PodSelector::Label(format!("job-name={}", hook.name)),
            "Pod" => PodSelector::Field(format!("metadata.name={}", hook.name)),
            _ => return Ok(()),
        };
        let namespace = derive_namespace(&hook.manifest, &hook.path, &self.release_namespace)?;

        let pods = self.client.pod_list(&namespace, &selector).await?;
        let mut sink = self.log_sink.lock().await;
        self.client
            .output_pod_logs(&pods, &namespace, sink.as_mut())
            .await?;

        self.emit(AppEvent::HookRun(HookRunEvent::LogsCollected {
            name: hook.name.clone(),
            pods: pods.len(),
        }));
        Ok(())
    }

    /// Best-effort variant: collection failures become warning events and
    /// never mask the hook outcome.
    pub async fn output_logs_best_effort(&self, hook: &HookSnapshot, policy: HookOutputLogPolicy) {
        if let Err(err) = self.output_logs_by_policy(hook, policy).await {
            self.emit(AppEvent::HookRun(HookRunEvent::LogCollectionFailed {
                name: hook.name.clone(),
                failure: FailureContext::from_error(&err),
            }));
        }
    }
}

/// Namespace the hook's resource lives in: `metadata.namespace` from the
/// first document of its own manifest when present, the release namespace
/// otherwise.
pub(crate) fn derive_namespace(
    manifest: &str,
    path: &str,
    release_namespace: &str,
) -> Result<String> {
    #[derive(Default, Deserialize)]
    #[serde(default)]
    struct Head {
        metadata: Metadata,
    }

    #[derive(Default, Deserialize)]
    #[serde(default)]
    struct Metadata {
        namespace: Option<String>,
    }

    let head = match serde_yml::Deserializer::from_str(manifest).next() {
        Some(document) => Head::deserialize(document).map_err(|err| HookError::ManifestParse {
            path: path.to_string(),
            message: err.to_string(),
        })?,
        None => Head::default(),
    };

    match head.metadata.namespace {
        Some(namespace) if !namespace.is_empty() => Ok(namespace),
        _ => Ok(release_namespace.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_release::v2;

    #[test]
    fn namespace_comes_from_manifest_metadata() {
        let manifest = "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: migrate\n  namespace: tools\n";
        let namespace = derive_namespace(manifest, "templates/job.yaml", "default").unwrap();
        assert_eq!(namespace, "tools");
    }

    #[test]
    fn namespace_falls_back_to_release() {
        let manifest = "kind: Job\nmetadata:\n  name: migrate\n";
        let namespace = derive_namespace(manifest, "templates/job.yaml", "prod").unwrap();
        assert_eq!(namespace, "prod");

        // An empty manifest has no opinion either.
        assert_eq!(derive_namespace("", "t.yaml", "prod").unwrap(), "prod");
    }

    #[test]
    fn namespace_reads_only_the_first_document() {
        let manifest = "metadata:\n  namespace: first\n---\nmetadata:\n  namespace: second\n";
        let namespace = derive_namespace(manifest, "templates/multi.yaml", "default").unwrap();
        assert_eq!(namespace, "first");
    }

    #[test]
    fn unparsable_manifest_names_the_hook_path() {
        let err = derive_namespace(": not yaml {", "templates/bad.yaml", "default").unwrap_err();
        assert!(err.to_string().contains("templates/bad.yaml"));
    }

    #[test]
    fn snapshot_captures_policy_membership() {
        let mut hook = v2::Hook {
            name: "migrate".into(),
            kind: "Job".into(),
            path: "templates/job.yaml".into(),
            delete_policies: vec![HookDeletePolicy::HookSucceeded],
            output_log_policies: vec![HookOutputLogPolicy::HookFailed],
            ..v2::Hook::default()
        };

        let snapshot = HookSnapshot::capture(&hook);
        assert!(snapshot.has_delete_policy(HookDeletePolicy::HookSucceeded));
        assert!(!snapshot.has_delete_policy(HookDeletePolicy::BeforeHookCreation));
        assert!(snapshot.has_output_log_policy(HookOutputLogPolicy::HookFailed));
        assert!(!snapshot.has_output_log_policy(HookOutputLogPolicy::HookSucceeded));

        // Snapshots are point-in-time: later mutation is not reflected.
        hook.delete_policies.clear();
        assert!(snapshot.has_delete_policy(HookDeletePolicy::HookSucceeded));
    }
}
