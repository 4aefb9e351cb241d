#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Cluster client contract for capstan
//!
//! The engines never talk to a cluster directly; they depend on the
//! [`ResourceClient`] and [`ResourceWaiter`] capability traits defined
//! here. A real implementation wraps an API server client; the [`mock`]
//! module ships a scriptable in-memory implementation that the engine
//! test suites drive.

pub mod client;
pub mod mock;
pub mod resource;

pub use client::{
    LogSink, PodInfo, PodList, PodSelector, ResourceClient, ResourceWaiter, WriterLogSink,
};
pub use mock::{MockOperation, MockResourceClient, RecordingLogSink};
pub use resource::{ResourceRef, ResourceSet};

use serde::{Deserialize, Serialize};

/// Readiness strategy selected by the caller.
///
/// `Ordered` additionally switches installation to the dependency-ordered
/// scheduler; every other value keeps the flat single-batch path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// No readiness gating beyond hook watches.
    #[default]
    None,
    /// Poll-based readiness checks.
    Legacy,
    /// Status-watch readiness, event driven.
    Watcher,
    /// Status-watch readiness plus dependency-ordered tiered installation.
    Ordered,
}

/// Options for creating resources on the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub server_side_apply: bool,
    pub force_conflicts: bool,
}

impl CreateOptions {
    /// Server-side apply with optional conflict forcing.
    #[must_use]
    pub fn server_side(force_conflicts: bool) -> Self {
        Self {
            server_side_apply: true,
            force_conflicts,
        }
    }
}

/// Cascade behavior for deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationPolicy {
    Background,
    Foreground,
    Orphan,
}
