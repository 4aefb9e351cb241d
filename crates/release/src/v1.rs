//! Classic release schema: string-typed fields, nested info block
//!
//! Kept readable by the current engines through the accessor traits; new
//! writes should prefer [`crate::v2`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accessor::{HookAccessor, ReleaseAccessor};
use crate::hook::{HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase};

/// Classic release snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub info: Info,
    #[serde(default)]
    pub chart_name: String,
    #[serde(default)]
    pub chart_version: String,
    #[serde(default)]
    pub manifest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    /// Labels were bolted on late in this schema and never serialized.
    #[serde(skip)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub apply_method: String,
}

/// Nested status block of the classic schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_deployed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<DateTime<Utc>>,
}

/// Classic hook record; events and policies are stored as wire strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub manifest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default)]
    pub weight: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_log_policies: Vec<String>,
    #[serde(default)]
    pub last_run: HookExecution,
}

/// Record of a hook's most recent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookExecution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: String,
}

impl ReleaseAccessor for Release {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn manifest(&self) -> &str {
        &self.manifest
    }

    fn notes(&self) -> &str {
        &self.info.notes
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn chart_name(&self) -> &str {
        &self.chart_name
    }

    fn chart_version(&self) -> String {
        self.chart_version.clone()
    }

    fn status(&self) -> String {
        self.info.status.clone()
    }

    fn apply_method(&self) -> String {
        self.apply_method.clone()
    }

    fn deployed_at(&self) -> Option<DateTime<Utc>> {
        self.info.last_deployed
    }

    fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    fn hook(&self, index: usize) -> Option<&dyn HookAccessor> {
        self.hooks.get(index).map(|h| h as &dyn HookAccessor)
    }

    fn hook_mut(&mut self, index: usize) -> Option<&mut dyn HookAccessor> {
        self.hooks
            .get_mut(index)
            .map(|h| h as &mut dyn HookAccessor)
    }
}

impl HookAccessor for Hook {
    fn path(&self) -> &str {
        &self.path
    }

    fn manifest(&self) -> &str {
        &self.manifest
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn weight(&self) -> i32 {
        self.weight
    }

    fn has_event(&self, event: HookEvent) -> bool {
        self.events.iter().any(|e| e == event.as_str())
    }

    fn has_delete_policy(&self, policy: HookDeletePolicy) -> bool {
        self.delete_policies.iter().any(|p| p == policy.as_str())
    }

    fn set_default_delete_policy(&mut self) {
        if self.delete_policies.is_empty() {
            self.delete_policies = vec![HookDeletePolicy::BeforeHookCreation.as_str().to_string()];
        }
    }

    fn has_output_log_policy(&self, policy: HookOutputLogPolicy) -> bool {
        self.output_log_policies.iter().any(|p| p == policy.as_str())
    }

    fn set_last_run_started(&mut self, now: DateTime<Utc>) {
        self.last_run = HookExecution {
            started_at: Some(now),
            completed_at: None,
            phase: HookPhase::Running.as_str().to_string(),
        };
    }

    fn set_last_run_phase(&mut self, phase: HookPhase) {
        self.last_run.phase = phase.as_str().to_string();
    }

    fn set_last_run_completed(&mut self, now: DateTime<Utc>) {
        self.last_run.completed_at = Some(now);
    }

    fn last_run_phase(&self) -> HookPhase {
        match self.last_run.phase.as_str() {
            "Running" => HookPhase::Running,
            "Succeeded" => HookPhase::Succeeded,
            "Failed" => HookPhase::Failed,
            _ => HookPhase::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hook() -> Hook {
        Hook {
            name: "migrate".into(),
            kind: "Job".into(),
            path: "templates/hooks/migrate.yaml".into(),
            events: vec!["pre-install".into(), "pre-upgrade".into()],
            ..Hook::default()
        }
    }

    #[test]
    fn string_typed_event_matching() {
        let h = hook();
        assert!(h.has_event(HookEvent::PreInstall));
        assert!(h.has_event(HookEvent::PreUpgrade));
        assert!(!h.has_event(HookEvent::PostInstall));
    }

    #[test]
    fn default_delete_policy_set_once_and_idempotent() {
        let mut h = hook();
        assert!(h.delete_policies.is_empty());

        h.set_default_delete_policy();
        assert_eq!(h.delete_policies, vec!["before-hook-creation"]);

        h.set_default_delete_policy();
        h.set_default_delete_policy();
        assert_eq!(h.delete_policies, vec!["before-hook-creation"]);
    }

    #[test]
    fn default_delete_policy_keeps_explicit_policies() {
        let mut h = hook();
        h.delete_policies = vec!["hook-succeeded".into()];
        h.set_default_delete_policy();
        assert_eq!(h.delete_policies, vec!["hook-succeeded"]);
        assert!(!h.has_delete_policy(HookDeletePolicy::BeforeHookCreation));
    }

    #[test]
    fn last_run_lifecycle() {
        let mut h = hook();
        assert_eq!(h.last_run_phase(), HookPhase::Unknown);

        let started = Utc::now();
        h.set_last_run_started(started);
        assert_eq!(h.last_run_phase(), HookPhase::Running);
        assert_eq!(h.last_run.started_at, Some(started));
        assert!(h.last_run.completed_at.is_none());

        h.set_last_run_phase(HookPhase::Unknown);
        let done = Utc::now();
        h.set_last_run_completed(done);
        h.set_last_run_phase(HookPhase::Succeeded);
        assert_eq!(h.last_run.completed_at, Some(done));
        assert_eq!(h.last_run_phase(), HookPhase::Succeeded);
    }

    #[test]
    fn starting_again_resets_completion() {
        let mut h = hook();
        h.set_last_run_started(Utc::now());
        h.set_last_run_completed(Utc::now());
        h.set_last_run_phase(HookPhase::Failed);

        h.set_last_run_started(Utc::now());
        assert!(h.last_run.completed_at.is_none());
        assert_eq!(h.last_run_phase(), HookPhase::Running);
    }
}
