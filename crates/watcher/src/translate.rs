//! Translation of raw `notify` events into watch events

use contractor_core::WatchEvent;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind};

/// Convert a `notify` event into zero or more watch events
///
/// Emits one event per path, except for a paired rename which becomes a
/// single rename keyed by its destination. Access and unclassified events
/// carry no change and are dropped.
pub fn from_notify(event: &Event) -> Vec<WatchEvent> {
    let paths = &event.paths;

    match event.kind {
        NotifyKind::Create(_) => paths.iter().cloned().map(WatchEvent::create).collect(),
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![WatchEvent::rename(paths[0].clone(), paths[1].clone())]
        }
        // Unpaired halves of a rename look like a delete and a create
        NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().cloned().map(WatchEvent::delete).collect()
        }
        NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().cloned().map(WatchEvent::create).collect()
        }
        NotifyKind::Modify(_) => paths.iter().cloned().map(WatchEvent::modify).collect(),
        NotifyKind::Remove(_) => paths.iter().cloned().map(WatchEvent::delete).collect(),
        NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => Vec::new(),
    }
}
