//! Filesystem change events as seen by the contractor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Type of file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// File created
    Create,
    /// File modified
    Modify,
    /// File deleted
    Delete,
    /// File renamed (event is keyed by the destination path)
    Rename,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Modify => "modify",
            EventKind::Delete => "delete",
            EventKind::Rename => "rename",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "modify" => Ok(EventKind::Modify),
            "delete" => Ok(EventKind::Delete),
            "rename" => Ok(EventKind::Rename),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

/// Metadata observed alongside an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// File size in bytes
    pub size: u64,
    /// Modification time (Unix milliseconds)
    pub modified_ms: u64,
}

/// File system event
///
/// Once accepted by a [`Contractor`](crate::Contractor) an event keeps its
/// identity for as long as it is pending. Later observations for the same
/// path are folded into it with [`WatchEvent::morph_into`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: EventKind,
    /// Source path of a rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PathBuf>,
    /// Metadata captured with the observation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FileMeta>,
    /// Number of later observations folded into this event
    #[serde(default)]
    pub morphs: u32,
}

impl WatchEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
            origin: None,
            meta: None,
            morphs: 0,
        }
    }

    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Create, path)
    }

    pub fn modify(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Modify, path)
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Delete, path)
    }

    /// Rename from `from` to `to`, keyed by `to`
    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let mut evt = Self::new(EventKind::Rename, to);
        evt.origin = Some(from.into());
        evt
    }

    pub fn with_meta(mut self, meta: FileMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_delete(&self) -> bool {
        self.kind == EventKind::Delete
    }

    /// True when both events are the same variant of change
    pub fn same_variant(&self, other: &WatchEvent) -> bool {
        self.kind == other.kind
    }

    /// Make this event represent `other` in place
    ///
    /// Everything observable is taken from `other`; only the morph counter
    /// survives (and is bumped), so the caller's handle on this event stays
    /// valid.
    pub fn morph_into(&mut self, other: WatchEvent) {
        self.path = other.path;
        self.kind = other.kind;
        self.origin = other.origin;
        self.meta = other.meta;
        self.morphs = self.morphs.saturating_add(1);
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(
                f,
                "{} {} -> {}",
                self.kind,
                origin.display(),
                self.path.display()
            ),
            None => write!(f, "{} {}", self.kind, self.path.display()),
        }
    }
}
