//! Capability traits over release schema versions
//!
//! The engines receive opaque release and hook values from the persistence
//! layer; [`accessor_mut`] and [`hook_accessor_mut`] dispatch them onto the
//! closed set of known schema types and hand back trait objects. Unknown
//! types are rejected with [`ReleaseError::UnsupportedSchema`] rather than
//! panicking inside an engine.

use std::any::Any;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use capstan_errors::{ReleaseError, Result};

use crate::hook::{HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase};
use crate::{v1, v2};

/// Marker for values that may be a release snapshot of some schema version.
pub trait Releaser: Any {}

impl Releaser for v1::Release {}
impl Releaser for v2::Release {}

/// Marker for values that may be a hook record of some schema version.
pub trait HookStep: Any {}

impl HookStep for v1::Hook {}
impl HookStep for v2::Hook {}

/// Schema-agnostic view of a release snapshot.
pub trait ReleaseAccessor: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn version(&self) -> u32;
    fn manifest(&self) -> &str;
    fn notes(&self) -> &str;
    fn labels(&self) -> &BTreeMap<String, String>;
    fn chart_name(&self) -> &str;
    fn chart_version(&self) -> String;
    fn status(&self) -> String;
    fn apply_method(&self) -> String;
    fn deployed_at(&self) -> Option<DateTime<Utc>>;

    /// Hooks are exposed positionally so callers can alternate shared and
    /// exclusive access to individual records while the release stays
    /// borrowed once.
    fn hook_count(&self) -> usize;
    fn hook(&self, index: usize) -> Option<&dyn HookAccessor>;
    fn hook_mut(&mut self, index: usize) -> Option<&mut dyn HookAccessor>;
}

/// Schema-agnostic view of one hook record.
pub trait HookAccessor: std::fmt::Debug + Send + Sync {
    fn path(&self) -> &str;
    fn manifest(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> &str;
    fn weight(&self) -> i32;

    fn has_event(&self, event: HookEvent) -> bool;
    fn has_delete_policy(&self, policy: HookDeletePolicy) -> bool;

    /// Default an empty delete-policy set to `before-hook-creation`.
    /// Idempotent; explicit policies are never overwritten.
    fn set_default_delete_policy(&mut self);

    fn has_output_log_policy(&self, policy: HookOutputLogPolicy) -> bool;

    /// Reset the last-run record: started now, phase `Running`, completion
    /// cleared.
    fn set_last_run_started(&mut self, now: DateTime<Utc>);
    fn set_last_run_phase(&mut self, phase: HookPhase);
    fn set_last_run_completed(&mut self, now: DateTime<Utc>);
    fn last_run_phase(&self) -> HookPhase;
}

/// Dispatch an opaque release value onto its schema's accessor.
///
/// # Errors
///
/// Returns `ReleaseError::UnsupportedSchema` if the value is not one of the
/// known release schema versions.
pub fn accessor_mut(release: &mut dyn Releaser) -> Result<&mut dyn ReleaseAccessor> {
    let any: &mut dyn Any = release;
    if any.is::<v1::Release>() {
        let release: &mut v1::Release = any.downcast_mut().ok_or(ReleaseError::UnsupportedSchema)?;
        Ok(release)
    } else if any.is::<v2::Release>() {
        let release: &mut v2::Release = any.downcast_mut().ok_or(ReleaseError::UnsupportedSchema)?;
        Ok(release)
    } else {
        Err(ReleaseError::UnsupportedSchema.into())
    }
}

/// Dispatch an opaque hook value onto its schema's accessor.
///
/// # Errors
///
/// Returns `ReleaseError::UnsupportedHookSchema` if the value is not one of
/// the known hook schema versions.
pub fn hook_accessor_mut(hook: &mut dyn HookStep) -> Result<&mut dyn HookAccessor> {
    let any: &mut dyn Any = hook;
    if any.is::<v1::Hook>() {
        let hook: &mut v1::Hook = any
            .downcast_mut()
            .ok_or(ReleaseError::UnsupportedHookSchema)?;
        Ok(hook)
    } else if any.is::<v2::Hook>() {
        let hook: &mut v2::Hook = any
            .downcast_mut()
            .ok_or(ReleaseError::UnsupportedHookSchema)?;
        Ok(hook)
    } else {
        Err(ReleaseError::UnsupportedHookSchema.into())
    }
}
