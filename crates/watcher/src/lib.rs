//! Watch event pipeline
//!
//! This crate connects a source of file system events to the contractor:
//! - Translation of `notify` events into watch events
//! - Per-path coalescing through a `Dispatcher`
//! - Interval-driven flushing and packing of finalized events

pub mod config;
pub mod dispatch;
pub mod pack;
pub mod translate;

pub use config::DispatchConfig;
pub use dispatch::{DispatchStats, Dispatcher, SharedDispatcher};
pub use pack::{pack, PackMode, PackedEvent};
pub use translate::from_notify;

pub use contractor_core::{EventKind, FileMeta, WatchEvent};
