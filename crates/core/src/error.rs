//! Contractor error types

use crate::contract::EventId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the [`Contractor`](crate::Contractor)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// A path was still occupied when a new event was accepted for it.
    /// The previous event was never morphed, unregistered or released.
    #[error("path still occupied, clean up should have run for {}", .path.display())]
    Occupied { path: PathBuf },

    /// `peek` was called for a path with no pending event
    #[error("no pending event for {}", .0.display())]
    NotPending(PathBuf),

    /// The store points at an event the arena no longer holds
    #[error("store entry for {} refers to missing event {id}", .path.display())]
    Unexpected { path: PathBuf, id: EventId },
}
