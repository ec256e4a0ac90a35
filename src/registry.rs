//! Thread Registry
//!
//! Process-wide mapping from thread identity to storage-area descriptor.
//! At any moment a thread identity maps to at most one descriptor and each
//! descriptor is referenced by exactly one key. The mapping is serialized by
//! a single mutex; per-area byte transfer happens under each handle's own
//! area lock, so distinct threads operate on disjoint areas in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use nix::libc;
use parking_lot::Mutex;

use crate::area::Area;

/// Identity of an OS thread, comparable for equality across threads.
///
/// Obtained by the thread itself via [`ThreadId::current`] and handed to
/// other threads out of band (a channel, a struct field) when they need to
/// clone this thread's storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    /// Identity of the calling thread.
    pub fn current() -> Self {
        // SAFETY: pthread_self() is always safe to call.
        Self(unsafe { libc::pthread_self() } as usize)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A registered storage area together with its owner's identity.
pub(crate) struct AreaHandle {
    pub(crate) owner: ThreadId,
    pub(crate) area: Mutex<Area>,
}

/// The thread-to-area mapping.
pub(crate) struct Registry {
    map: Mutex<HashMap<ThreadId, Arc<AreaHandle>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a mapping. The caller must have verified no entry exists for
    /// `tid`; only the thread identified by `tid` may insert its own entry,
    /// which is what makes the check-then-insert race-free.
    pub(crate) fn insert(&self, tid: ThreadId, handle: Arc<AreaHandle>) {
        let prev = self.map.lock().insert(tid, handle);
        debug_assert!(prev.is_none(), "thread {} registered twice", tid);
    }

    /// Look up the descriptor registered for `tid`, if any.
    pub(crate) fn lookup(&self, tid: ThreadId) -> Option<Arc<AreaHandle>> {
        self.map.lock().get(&tid).cloned()
    }

    /// Remove and return the entry for `tid`, if any.
    pub(crate) fn remove(&self, tid: ThreadId) -> Option<Arc<AreaHandle>> {
        self.map.lock().remove(&tid)
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, initialized lazily on first use.
pub(crate) fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_for(tid: ThreadId) -> Arc<AreaHandle> {
        Arc::new(AreaHandle {
            owner: tid,
            area: Mutex::new(Area::new(1).unwrap()),
        })
    }

    #[test]
    fn test_insert_lookup_remove() {
        let registry = Registry::new();
        let tid = ThreadId::current();
        assert!(registry.lookup(tid).is_none());

        registry.insert(tid, handle_for(tid));
        let found = registry.lookup(tid).expect("inserted entry");
        assert_eq!(found.owner, tid);

        assert!(registry.remove(tid).is_some());
        assert!(registry.lookup(tid).is_none());
        assert!(registry.remove(tid).is_none());
    }

    #[test]
    fn test_distinct_ids_are_distinct_entries() {
        let registry = Registry::new();
        let a = ThreadId(1);
        let b = ThreadId(2);
        registry.insert(a, handle_for(a));
        registry.insert(b, handle_for(b));
        assert_eq!(registry.lookup(a).unwrap().owner, a);
        assert_eq!(registry.lookup(b).unwrap().owner, b);
        registry.remove(a);
        assert!(registry.lookup(b).is_some());
        registry.remove(b);
    }

    #[test]
    fn test_current_is_stable_within_a_thread() {
        assert_eq!(ThreadId::current(), ThreadId::current());
    }
}
