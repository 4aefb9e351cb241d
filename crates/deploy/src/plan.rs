//! Tiered installation plan

/// Ordered installation tiers over one chart's direct sub-units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    tiers: Vec<Vec<String>>,
    deferred: Vec<String>,
}

impl InstallPlan {
    pub(crate) fn new(tiers: Vec<Vec<String>>, deferred: Vec<String>) -> Self {
        Self { tiers, deferred }
    }

    /// Dependency tiers in installation order; members of one tier are
    /// mutually unordered and may install concurrently.
    #[must_use]
    pub fn tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }

    /// Isolated nodes, with no predecessor and no dependent. They install
    /// in the trailing batch alongside the owning chart's own resources
    /// instead of leading the schedule, which plain in-degree peeling
    /// would have them do.
    #[must_use]
    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty() && self.deferred.is_empty()
    }

    /// Every node in installation order, deferred nodes last.
    #[must_use]
    pub fn installation_order(&self) -> Vec<&str> {
        self.tiers
            .iter()
            .flatten()
            .chain(&self.deferred)
            .map(String::as_str)
            .collect()
    }
}
