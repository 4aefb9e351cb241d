#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Release schemas and capability accessors for capstan
//!
//! A release snapshot records one deployed unit: identity, manifest text,
//! notes, status, and the ordered lifecycle hooks bound to it. Two on-disk
//! schema versions exist: [`v1`] (classic, string-typed fields, nested info
//! block) and [`v2`] (current, typed enums, flattened info). The engines
//! never touch either schema directly; they work against the
//! [`ReleaseAccessor`] and [`HookAccessor`] capability traits, and
//! [`accessor_mut`] / [`hook_accessor_mut`] dispatch an opaque value onto
//! whichever schema it turns out to be.

pub mod accessor;
pub mod hook;
pub mod status;
pub mod store;
pub mod v1;
pub mod v2;

pub use accessor::{
    accessor_mut, hook_accessor_mut, HookAccessor, HookStep, ReleaseAccessor, Releaser,
};
pub use hook::{HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase};
pub use status::{ApplyMethod, ReleaseStatus};
pub use store::{MemoryReleaseStore, ReleaseStore};
