use serde::{Deserialize, Serialize};

/// Tiered deployment events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeployEvent {
    /// Dependency graph built over a chart's direct sub-units
    GraphBuilt {
        chart: String,
        nodes: usize,
        edges: usize,
    },

    /// Installation plan computed from the graph
    PlanComputed {
        chart: String,
        tiers: usize,
        deferred: usize,
    },

    /// A tier started installing
    TierStarted { tier: usize, nodes: Vec<String> },

    /// A plain node's chart was rendered
    ChartRendered { name: String },

    /// A recursive node finished installing its own sub-tree
    SubChartInstalled { name: String },

    /// A tier's combined manifests were applied in one request
    TierApplied { tier: usize, resources: usize },

    /// A tier's resources all reached ready state
    TierReady { tier: usize },

    /// A tier failed; in-flight siblings were cancelled best-effort
    TierFailed {
        tier: usize,
        failure: super::FailureContext,
    },

    /// The whole chart finished installing
    Completed { chart: String, tiers: usize },
}

impl DeployEvent {
    /// Create a tier failed event
    pub fn tier_failed(tier: usize, failure: super::FailureContext) -> Self {
        Self::TierFailed { tier, failure }
    }
}
