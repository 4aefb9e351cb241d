#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency-ordered chart installation for capstan
//!
//! Charts declare ordering over their direct sub-units in two places: a
//! `capstan.io/depends-on` annotation on the sub-unit and structured
//! `dependencies` entries on the parent. [`ChartGraph`] merges both into
//! one graph per chart, [`InstallPlan`] peels it into tiers, and
//! [`TieredInstaller`] walks the tiers: nodes inside a tier install
//! concurrently, tiers themselves strictly one after another. Sub-units
//! carrying their own declarations recurse with their own graph.
//!
//! Ordering only activates under [`capstan_kube::WaitStrategy::Ordered`];
//! every other strategy keeps the flat single-batch path.

pub mod graph;
pub mod installer;
pub mod plan;

pub use graph::ChartGraph;
pub use installer::{ChartRenderer, TieredInstaller};
pub use plan::InstallPlan;
