//! Event contraction
//!
//! Folds rapid notifications for the same path into one pending event so
//! the consumer only ever works on a single live event per path.
//!
//! The store maps each path to the id of its pending event. Event values
//! live in a separate arena keyed by id, which is what lets a morph update
//! an event without invalidating the [`PackHook`] handed out when it was
//! accepted, and lets a superseded event outlive its store entry until the
//! consumer is done with it.

use crate::error::ContractError;
use crate::event::WatchEvent;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type Map<K, V> = HashMap<K, V, ahash::RandomState>;

/// Identity of an accepted event
///
/// Ids are never reused within one contractor, so a stale id can't alias a
/// newer event at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Release capability for an accepted event
///
/// Handed out by [`Contractor::register`]. The consumer passes it back to
/// [`Contractor::release`] once it has packed the event. Releasing only ever
/// clears the store entry it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHook {
    id: EventId,
    path: PathBuf,
}

impl PackHook {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of [`Contractor::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Registration {
    /// The event is now pending; the caller owns it and must release the hook
    Accepted(PackHook),
    /// The event was folded into the already pending event with this id;
    /// the caller must discard it
    Morphed(EventId),
}

impl Registration {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Registration::Accepted(_))
    }

    pub fn hook(self) -> Option<PackHook> {
        match self {
            Registration::Accepted(hook) => Some(hook),
            Registration::Morphed(_) => None,
        }
    }
}

/// Outcome of [`Contractor::release`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// The event was still pending and its path is now free
    Removed(WatchEvent),
    /// The hook had been detached; the event is handed back, the store is untouched
    Detached(WatchEvent),
    /// Nothing left to release (already released)
    Stale,
}

impl Release {
    pub fn event(&self) -> Option<&WatchEvent> {
        match self {
            Release::Removed(evt) | Release::Detached(evt) => Some(evt),
            Release::Stale => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Release::Removed(_))
    }
}

struct Slot {
    event: WatchEvent,
    /// Cleared by `unregister`; a disarmed hook never touches the store
    armed: bool,
}

/// Coalesces events by path
///
/// Not internally synchronized: every mutation takes `&mut self`, so callers
/// with several producers must serialize access themselves.
#[derive(Default)]
pub struct Contractor {
    /// path -> pending event
    store: Map<PathBuf, EventId>,
    /// Every accepted, unreleased event (pending or superseded)
    arena: Map<EventId, Slot>,
    next_id: u64,
}

impl Contractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `path` has a pending event
    pub fn is_pending(&self, path: &Path) -> bool {
        self.store.contains_key(path)
    }

    /// Get the pending event for `path`
    ///
    /// Calling this for a path that isn't pending is a caller bug and
    /// returns [`ContractError::NotPending`].
    pub fn peek(&self, path: &Path) -> Result<&WatchEvent, ContractError> {
        let id = self
            .store
            .get(path)
            .ok_or_else(|| ContractError::NotPending(path.to_path_buf()))?;
        self.arena
            .get(id)
            .map(|slot| &slot.event)
            .ok_or_else(|| ContractError::Unexpected {
                path: path.to_path_buf(),
                id: *id,
            })
    }

    /// Event behind a hook, whether still pending or already superseded
    pub fn event(&self, hook: &PackHook) -> Option<&WatchEvent> {
        self.arena.get(&hook.id).map(|slot| &slot.event)
    }

    /// True while releasing `hook` would still clear its store entry
    pub fn is_armed(&self, hook: &PackHook) -> bool {
        self.arena.get(&hook.id).is_some_and(|slot| slot.armed)
    }

    /// Register a newly observed event
    ///
    /// Returns [`Registration::Accepted`] when `evt` became the pending event
    /// for its path, or [`Registration::Morphed`] when it was folded into the
    /// event already pending there. Only events of the same variant, or
    /// deletes, are folded; any other arrival supersedes the pending event.
    pub fn register(&mut self, evt: WatchEvent) -> Result<Registration, ContractError> {
        if let Some(&old_id) = self.store.get(evt.path()) {
            let old = match self.arena.get_mut(&old_id) {
                Some(slot) => &mut slot.event,
                None => {
                    return Err(ContractError::Unexpected {
                        path: evt.path,
                        id: old_id,
                    })
                }
            };

            // TODO: other pairs (create then modify, for one) could be folded too
            if old.same_variant(&evt) {
                debug!("Morphing {} into {} ({})", old, evt, old_id);
                old.morph_into(evt);
                return Ok(Registration::Morphed(old_id));
            }

            // delete overrides any other event
            if evt.is_delete() {
                debug!("Delete overrides {} ({})", old, old_id);
                old.morph_into(evt);
                return Ok(Registration::Morphed(old_id));
            }

            debug!("{} supersedes {} ({})", evt, old, old_id);
            self.unregister(old_id);
        }

        self.accept(evt)
    }

    fn accept(&mut self, evt: WatchEvent) -> Result<Registration, ContractError> {
        if self.store.contains_key(evt.path()) {
            return Err(ContractError::Occupied { path: evt.path });
        }

        let id = EventId(self.next_id);
        self.next_id += 1;

        let hook = PackHook {
            id,
            path: evt.path.clone(),
        };
        self.store.insert(evt.path.clone(), id);
        self.arena.insert(id, Slot { event: evt, armed: true });

        Ok(Registration::Accepted(hook))
    }

    /// Detach the hook of an accepted event
    ///
    /// The event's store entry is cleared first if it is still the pending
    /// one, then its hook is made inert: releasing it later hands the event
    /// back without touching the store. The event itself stays readable
    /// through its hook until released. Returns false if there was no armed
    /// hook to detach.
    pub fn unregister(&mut self, id: EventId) -> bool {
        let Some(slot) = self.arena.get_mut(&id) else {
            return false;
        };
        if !slot.armed {
            return false;
        }
        slot.armed = false;

        if self.store.get(slot.event.path()) == Some(&id) {
            self.store.remove(slot.event.path());
        }
        true
    }

    /// Fire the finalize hook of an event the consumer is done with
    ///
    /// Clears the path only if it still holds this exact event. Releasing a
    /// hook twice, or one whose event was superseded, is tolerated.
    pub fn release(&mut self, hook: PackHook) -> Result<Release, ContractError> {
        let PackHook { id, path } = hook;

        let Some(slot) = self.arena.remove(&id) else {
            if self.store.get(&path) == Some(&id) {
                return Err(ContractError::Unexpected { path, id });
            }
            info!("Contractor failed to unrecord event: '{}'", path.display());
            return Ok(Release::Stale);
        };

        if !slot.armed {
            info!("Released detached event {} ({}), store left as is", slot.event, id);
            return Ok(Release::Detached(slot.event));
        }

        match self.store.get(&path) {
            Some(&current) if current == id => {
                self.store.remove(&path);
                Ok(Release::Removed(slot.event))
            }
            _ => {
                info!("Contractor failed to unrecord event: '{}'", path.display());
                Ok(Release::Detached(slot.event))
            }
        }
    }

    /// Number of paths with a pending event
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of accepted events not yet released, superseded ones included
    pub fn in_flight(&self) -> usize {
        self.arena.len()
    }

    pub fn pending_paths(&self) -> impl Iterator<Item = &Path> {
        self.store.keys().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, FileMeta};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn accept(contractor: &mut Contractor, evt: WatchEvent) -> PackHook {
        contractor
            .register(evt)
            .unwrap()
            .hook()
            .expect("event should be accepted")
    }

    fn meta(size: u64) -> FileMeta {
        FileMeta {
            size,
            modified_ms: size * 1000,
        }
    }

    /// Every store entry points at an armed arena slot for the same path
    fn assert_consistent(contractor: &Contractor) {
        for (path, id) in &contractor.store {
            let slot = contractor.arena.get(id).expect("store entry without event");
            assert!(slot.armed, "pending event {} is detached", id);
            assert_eq!(slot.event.path(), path.as_path());
        }
        let armed = contractor.arena.values().filter(|s| s.armed).count();
        assert_eq!(armed, contractor.store.len());
    }

    #[test]
    fn test_register_absent_path() {
        let mut contractor = Contractor::new();
        assert!(!contractor.is_pending(Path::new("a")));

        let reg = contractor.register(WatchEvent::create("a")).unwrap();
        assert!(reg.is_accepted());
        assert!(contractor.is_pending(Path::new("a")));
        assert_eq!(contractor.peek(Path::new("a")).unwrap(), &WatchEvent::create("a"));
        assert_eq!(contractor.len(), 1);
    }

    #[test]
    fn test_peek_missing_path() {
        let contractor = Contractor::new();
        assert_eq!(
            contractor.peek(Path::new("nope")),
            Err(ContractError::NotPending(PathBuf::from("nope")))
        );
    }

    #[test]
    fn test_same_variant_morphs() {
        let mut contractor = Contractor::new();
        let hook = accept(&mut contractor, WatchEvent::create("a").with_meta(meta(1)));

        let reg = contractor
            .register(WatchEvent::create("a").with_meta(meta(2)))
            .unwrap();
        assert_eq!(reg, Registration::Morphed(hook.id()));
        assert!(!reg.is_accepted());

        let pending = contractor.peek(Path::new("a")).unwrap();
        assert_eq!(pending.kind, EventKind::Create);
        assert_eq!(pending.meta, Some(meta(2)));
        assert_eq!(pending.morphs, 1);
        assert!(contractor.is_armed(&hook));
        assert_eq!(contractor.in_flight(), 1);
    }

    #[test]
    fn test_delete_dominates() {
        for first in [
            WatchEvent::create("a"),
            WatchEvent::modify("a"),
            WatchEvent::rename("b", "a"),
        ] {
            let mut contractor = Contractor::new();
            let hook = accept(&mut contractor, first);

            let reg = contractor.register(WatchEvent::delete("a")).unwrap();
            assert_eq!(reg, Registration::Morphed(hook.id()));

            let pending = contractor.peek(Path::new("a")).unwrap();
            assert!(pending.is_delete());
            assert_eq!(pending.origin, None);
            assert_eq!(contractor.event(&hook), Some(pending));
        }
    }

    #[test]
    fn test_different_variant_supersedes() {
        let mut contractor = Contractor::new();
        let create = accept(&mut contractor, WatchEvent::create("a"));

        let reg = contractor.register(WatchEvent::modify("a")).unwrap();
        let modify = reg.hook().expect("modify should be accepted");

        assert_ne!(create.id(), modify.id());
        assert!(!contractor.is_armed(&create));
        assert!(contractor.is_armed(&modify));
        assert_eq!(contractor.peek(Path::new("a")).unwrap().kind, EventKind::Modify);
        assert_eq!(contractor.len(), 1);

        // the superseded event is still readable by whoever holds its hook
        assert_eq!(contractor.event(&create).unwrap().kind, EventKind::Create);
        assert_eq!(contractor.in_flight(), 2);
    }

    #[test]
    fn test_superseded_hook_leaves_replacement_alone() {
        let mut contractor = Contractor::new();
        let create = accept(&mut contractor, WatchEvent::create("a"));
        let modify = accept(&mut contractor, WatchEvent::modify("a"));

        let released = contractor.release(create).unwrap();
        assert_eq!(released, Release::Detached(WatchEvent::create("a")));
        assert!(contractor.is_pending(Path::new("a")));
        assert_eq!(contractor.peek(Path::new("a")).unwrap().kind, EventKind::Modify);

        assert!(contractor.release(modify).unwrap().is_removed());
        assert!(!contractor.is_pending(Path::new("a")));
        assert_eq!(contractor.in_flight(), 0);
    }

    #[test]
    fn test_release_twice_is_tolerated() {
        let mut contractor = Contractor::new();
        let hook = accept(&mut contractor, WatchEvent::create("a"));

        let first = contractor.release(hook.clone()).unwrap();
        assert!(first.is_removed());
        assert!(!contractor.is_pending(Path::new("a")));

        assert_eq!(contractor.release(hook).unwrap(), Release::Stale);
        assert!(contractor.is_empty());
    }

    #[test]
    fn test_release_after_morph_targets_updated_event() {
        let mut contractor = Contractor::new();
        let hook = accept(&mut contractor, WatchEvent::modify("a"));
        let _ = contractor.register(WatchEvent::delete("a")).unwrap();

        let released = contractor.release(hook).unwrap();
        assert_eq!(released.event().map(|e| e.kind), Some(EventKind::Delete));
        assert!(released.is_removed());
        assert!(!contractor.is_pending(Path::new("a")));
    }

    #[test]
    fn test_path_reused_after_release() {
        let mut contractor = Contractor::new();
        let first = accept(&mut contractor, WatchEvent::create("a"));
        contractor.release(first.clone()).unwrap();

        let second = accept(&mut contractor, WatchEvent::create("a"));
        assert_ne!(first.id(), second.id());

        // an old hook must not clear the newer entry
        assert_eq!(contractor.release(first).unwrap(), Release::Stale);
        assert!(contractor.is_pending(Path::new("a")));
        assert!(contractor.is_armed(&second));
    }

    #[test]
    fn test_unregister_detaches_and_vacates() {
        let mut contractor = Contractor::new();
        let hook = accept(&mut contractor, WatchEvent::create("a"));

        assert!(contractor.unregister(hook.id()));
        assert!(!contractor.unregister(hook.id()));
        assert!(!contractor.is_pending(Path::new("a")));
        assert!(!contractor.is_armed(&hook));

        // a fresh event for the path is accepted, not morphed into the detached one
        let next = contractor.register(WatchEvent::create("a")).unwrap();
        assert!(next.is_accepted());

        let released = contractor.release(hook).unwrap();
        assert!(matches!(released, Release::Detached(_)));
        assert!(contractor.is_pending(Path::new("a")));
    }

    #[test]
    fn test_paths_are_independent() {
        let mut contractor = Contractor::new();
        let a = accept(&mut contractor, WatchEvent::create("a"));
        let b = accept(&mut contractor, WatchEvent::create("b"));
        let _ = contractor.register(WatchEvent::delete("b")).unwrap();

        assert_eq!(contractor.peek(Path::new("a")).unwrap().kind, EventKind::Create);
        assert_eq!(contractor.peek(Path::new("b")).unwrap().kind, EventKind::Delete);

        contractor.release(a).unwrap();
        let mut paths: Vec<_> = contractor.pending_paths().collect();
        paths.sort();
        assert_eq!(paths, vec![Path::new("b")]);
        contractor.release(b).unwrap();
        assert!(contractor.is_empty());
    }

    #[test]
    fn test_store_pointing_at_missing_event_is_unexpected() {
        let mut contractor = Contractor::new();
        let hook = accept(&mut contractor, WatchEvent::create("a"));

        // drop the event behind the store entry
        contractor.arena.remove(&hook.id());
        let unexpected = ContractError::Unexpected {
            path: PathBuf::from("a"),
            id: hook.id(),
        };

        assert_eq!(contractor.peek(Path::new("a")), Err(unexpected.clone()));
        assert_eq!(
            contractor.register(WatchEvent::modify("a")),
            Err(unexpected.clone())
        );
        assert_eq!(contractor.release(hook), Err(unexpected));
        assert!(contractor.is_pending(Path::new("a")));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_stale_releases_logged_at_info() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut contractor = Contractor::new();
            let create = accept(&mut contractor, WatchEvent::create("a"));
            let modify = accept(&mut contractor, WatchEvent::modify("a"));

            assert!(matches!(contractor.release(create), Ok(Release::Detached(_))));
            assert!(contractor.release(modify.clone()).unwrap().is_removed());
            assert_eq!(contractor.release(modify).unwrap(), Release::Stale);
        });

        let output = logs.contents();
        assert!(output.contains("Released detached event create a"), "logs: {}", output);
        assert!(output.contains("Contractor failed to unrecord event: 'a'"), "logs: {}", output);
    }

    #[test]
    fn test_random_sequences_keep_one_entry_per_path() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let paths = ["a", "b", "c", "d"];
        let kinds = [
            EventKind::Create,
            EventKind::Modify,
            EventKind::Delete,
            EventKind::Rename,
        ];

        let mut contractor = Contractor::new();
        let mut hooks: Vec<PackHook> = Vec::new();

        for _ in 0..5_000 {
            if hooks.is_empty() || rng.gen_bool(0.6) {
                let path = paths[rng.gen_range(0..paths.len())];
                let kind = kinds[rng.gen_range(0..kinds.len())];
                let pending_before = contractor.peek(Path::new(path)).ok().map(|e| e.kind);

                let reg = contractor.register(WatchEvent::new(kind, path)).unwrap();
                let expect_morph = match pending_before {
                    Some(old) => old == kind || kind == EventKind::Delete,
                    None => false,
                };
                assert_eq!(!reg.is_accepted(), expect_morph);
                assert_eq!(contractor.peek(Path::new(path)).unwrap().kind, kind);

                if let Some(hook) = reg.hook() {
                    hooks.push(hook);
                }
            } else {
                let idx = rng.gen_range(0..hooks.len());
                let hook = if rng.gen_bool(0.1) {
                    hooks[idx].clone()
                } else {
                    hooks.swap_remove(idx)
                };
                let _ = contractor.release(hook).unwrap();
            }

            assert_consistent(&contractor);
            assert!(contractor.len() <= paths.len());
        }

        for hook in hooks {
            let _ = contractor.release(hook).unwrap();
        }
        assert!(contractor.is_empty());
        assert_eq!(contractor.in_flight(), 0);
    }
}
