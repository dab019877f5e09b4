//! Event contraction core
//!
//! This crate provides:
//! - The watch event model (`WatchEvent`, `EventKind`)
//! - The `Contractor`: a per-path store of pending events that morphs
//!   repeated notifications into the event already pending for a path
//! - Release hooks (`PackHook`) that free a path once its event is packed

pub mod contract;
pub mod error;
pub mod event;

// Re-exports
pub use contract::{Contractor, EventId, PackHook, Registration, Release};
pub use error::ContractError;
pub use event::{EventKind, FileMeta, WatchEvent};
