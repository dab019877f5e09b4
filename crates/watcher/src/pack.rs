//! Packing of finalized events for downstream consumers

use anyhow::{Context, Result};
use contractor_core::{EventKind, WatchEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mode of a packed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackMode {
    Create,
    Modify,
    Delete,
    Moved,
}

impl From<EventKind> for PackMode {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create => PackMode::Create,
            EventKind::Modify => PackMode::Modify,
            EventKind::Delete => PackMode::Delete,
            EventKind::Rename => PackMode::Moved,
        }
    }
}

/// A finalized event, ready to hand to whatever applies it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedEvent {
    pub mode: PackMode,
    pub filepath: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<u64>,
    /// Observations folded into this event before it was packed
    #[serde(default)]
    pub coalesced: u32,
}

impl PackedEvent {
    /// Serialize as a single JSON line
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize packed event")
    }
}

/// Pack the current state of an event
pub fn pack(evt: &WatchEvent) -> PackedEvent {
    PackedEvent {
        mode: evt.kind.into(),
        filepath: evt.path.clone(),
        original_path: evt.origin.clone(),
        size: evt.meta.map(|m| m.size),
        modified_ms: evt.meta.map(|m| m.modified_ms),
        coalesced: evt.morphs,
    }
}
