//! Release persistence capability

use std::sync::Mutex;

use async_trait::async_trait;

use capstan_errors::Result;

use crate::accessor::ReleaseAccessor;
use crate::hook::HookPhase;

/// Persistence collaborator owned by the caller; the engines never persist
/// directly, they hand the mutated snapshot back through this trait.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Fire-and-forget record of in-progress state. Implementations swallow
    /// their own failures; the engines keep going either way.
    async fn record(&self, release: &dyn ReleaseAccessor);

    /// Durable persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot could not be written.
    async fn update(&self, release: &dyn ReleaseAccessor) -> Result<()>;
}

/// Point-in-time copy of the fields tests care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub name: String,
    pub namespace: String,
    pub version: u32,
    pub hook_phases: Vec<HookPhase>,
}

impl StoredSnapshot {
    fn capture(release: &dyn ReleaseAccessor) -> Self {
        let hook_phases = (0..release.hook_count())
            .filter_map(|i| release.hook(i))
            .map(|h| h.last_run_phase())
            .collect();
        Self {
            name: release.name().to_string(),
            namespace: release.namespace().to_string(),
            version: release.version(),
            hook_phases,
        }
    }
}

/// In-memory store keeping every recorded snapshot in order.
///
/// Useful as the persistence collaborator in tests and dry runs: the full
/// record sequence shows when the engines checkpointed hook state.
#[derive(Debug, Default)]
pub struct MemoryReleaseStore {
    records: Mutex<Vec<StoredSnapshot>>,
    updates: Mutex<Vec<StoredSnapshot>>,
}

impl MemoryReleaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots captured by `record`, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<StoredSnapshot> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Snapshots captured by `update`, oldest first.
    #[must_use]
    pub fn updated(&self) -> Vec<StoredSnapshot> {
        self.updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn record(&self, release: &dyn ReleaseAccessor) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(StoredSnapshot::capture(release));
    }

    async fn update(&self, release: &dyn ReleaseAccessor) -> Result<()> {
        self.updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(StoredSnapshot::capture(release));
        Ok(())
    }
}
