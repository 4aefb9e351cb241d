//! Current release schema: typed enums, flattened info fields

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::accessor::{HookAccessor, ReleaseAccessor};
use crate::hook::{HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase};
use crate::status::{ApplyMethod, ReleaseStatus};

/// Current release snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_deployed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<DateTime<Utc>>,
    pub chart_name: String,
    pub chart_version: Version,
    #[serde(default)]
    pub manifest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub apply_method: ApplyMethod,
}

/// Typed hook record.
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
    pub events: Vec<HookEvent>,
    #[serde(default)]
    pub weight: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_policies: Vec<HookDeletePolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_log_policies: Vec<HookOutputLogPolicy>,
    #[serde(default)]
    pub last_run: HookExecution,
}

/// Record of a hook's most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HookExecution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: HookPhase,
}

impl Release {
    /// Create an empty snapshot for the given chart reference.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart_name: impl Into<String>,
        chart_version: Version,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: 0,
            status: ReleaseStatus::default(),
            notes: String::new(),
            first_deployed: None,
            last_deployed: None,
            chart_name: chart_name.into(),
            chart_version,
            manifest: String::new(),
            hooks: Vec::new(),
            labels: BTreeMap::new(),
            apply_method: ApplyMethod::default(),
        }
    }
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
        &self.notes
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    fn chart_name(&self) -> &str {
        &self.chart_name
    }

    fn chart_version(&self) -> String {
        self.chart_version.to_string()
    }

    fn status(&self) -> String {
        self.status.to_string()
    }

    fn apply_method(&self) -> String {
        self.apply_method.to_string()
    }

    fn deployed_at(&self) -> Option<DateTime<Utc>> {
        self.last_deployed
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
        self.events.contains(&event)
    }

    fn has_delete_policy(&self, policy: HookDeletePolicy) -> bool {
        self.delete_policies.contains(&policy)
    }

    fn set_default_delete_policy(&mut self) {
        if self.delete_policies.is_empty() {
            self.delete_policies = vec![HookDeletePolicy::BeforeHookCreation];
        }
    }

    fn has_output_log_policy(&self, policy: HookOutputLogPolicy) -> bool {
        self.output_log_policies.contains(&policy)
    }

    fn set_last_run_started(&mut self, now: DateTime<Utc>) {
        self.last_run = HookExecution {
            started_at: Some(now),
            completed_at: None,
            phase: HookPhase::Running,
        };
    }

    fn set_last_run_phase(&mut self, phase: HookPhase) {
        self.last_run.phase = phase;
    }

    fn set_last_run_completed(&mut self, now: DateTime<Utc>) {
        self.last_run.completed_at = Some(now);
    }

    fn last_run_phase(&self) -> HookPhase {
        self.last_run.phase
    }
}
