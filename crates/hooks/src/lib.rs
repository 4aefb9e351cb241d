#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Lifecycle hook execution for capstan
//!
//! Runs the hooks a release binds to a lifecycle event, strictly ordered
//! by `(weight, name)`, against a cluster reached through the
//! [`capstan_kube::ResourceClient`] seam. Execution is two-phase: the
//! engine applies and watches every selected hook, then hands back a
//! deferred [`HookCleanup`] so callers can finish their own release
//! bookkeeping before hook resources are torn down by policy.

mod cleanup;
mod executor;
mod ops;

pub use cleanup::HookCleanup;
pub use executor::{HookExecutor, HookRun};
pub use ops::SharedLogSink;
