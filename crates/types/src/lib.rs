#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the capstan deployment core
//!
//! This crate provides the chart data model shared by the hook engine and
//! the tiered deployment scheduler: chart trees, chart metadata, and the
//! dependency declarations that drive installation ordering.

pub mod chart;

// Re-export commonly used types
pub use chart::{Chart, ChartMetadata, DependencyRef};
pub use semver::{Version, VersionReq};

/// Annotation key on a sub-chart listing the sibling sub-charts that must be
/// ready before it installs, as a comma-separated name list.
pub const DEPENDS_ON_ANNOTATION: &str = "capstan.io/depends-on";
