//! Calling contexts and their handle enumeration lists.
//!
//! A [`Session`] stands for one caller (an open file, a connection, a client
//! process). Object tables record the owning session of every object and link
//! the object into the session's list so the session can enumerate its
//! handles. The list holds identifiers only; storage stays with the table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::namespace::Namespace;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One entry of a session's enumeration list.
#[derive(Debug, Clone)]
pub(crate) struct SessionLink {
    pub(crate) namespace: Weak<Namespace>,
    pub(crate) serial: u64,
    pub(crate) handle: u32,
    pub(crate) type_tag: u16,
}

impl SessionLink {
    // A link outlives its object only when the whole namespace was dropped.
    fn is_live(&self) -> bool {
        self.namespace.strong_count() > 0
    }
}

/// Live handle owned by a session, as reported by [`Session::handles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Id of the namespace holding the object, if it is still registered.
    pub namespace: Option<u16>,
    /// Display name of that namespace.
    pub namespace_name: String,
    /// Handle id within the namespace's table.
    pub handle: u32,
    /// Type tag of the object.
    pub type_tag: u16,
}

/// Calling context owning a set of live objects.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    links: Mutex<Vec<SessionLink>>,
}

impl Session {
    /// Creates a session with a fresh id.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            links: Mutex::new(Vec::new()),
        })
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Lists the live objects this session owns, oldest first.
    ///
    /// Objects whose namespace has been dropped entirely are skipped.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.lock_links()
            .iter()
            .filter_map(|link| {
                let namespace = link.namespace.upgrade()?;
                Some(SessionHandle {
                    namespace: namespace.id(),
                    namespace_name: namespace.name().to_owned(),
                    handle: link.handle,
                    type_tag: link.type_tag,
                })
            })
            .collect()
    }

    /// Number of objects [`Session::handles`] would list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_links()
            .iter()
            .filter(|link| link.is_live())
            .count()
    }

    /// Returns true when [`Session::handles`] would list nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.lock_links().iter().any(SessionLink::is_live)
    }

    pub(crate) fn link(&self, link: SessionLink) {
        let mut links = self.lock_links();
        links.retain(SessionLink::is_live);
        links.push(link);
    }

    pub(crate) fn unlink(&self, serial: u64) {
        self.lock_links().retain(|link| link.serial != serial);
    }

    pub(crate) fn snapshot(&self) -> Vec<SessionLink> {
        self.lock_links().clone()
    }

    // Links are pushed or removed in one step, so a poisoned list is intact.
    fn lock_links(&self) -> MutexGuard<'_, Vec<SessionLink>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::table::ObjectTable;

    const FILE_TYPE: u16 = 3;

    #[test]
    fn counts_follow_enumeration() {
        let namespace = Namespace::builder("files").build().expect("namespace");
        let live = ObjectTable::new(Arc::downgrade(&namespace), 4);
        let orphaned = ObjectTable::new(Weak::new(), 4);
        let session = Session::new();

        let kept = live.create(&session, FILE_TYPE, 1).expect("create live");
        let lost = orphaned.create(&session, FILE_TYPE, 2).expect("create orphan");

        assert_eq!(session.handles().len(), 1);
        assert_eq!(session.len(), 1);
        assert!(!session.is_empty());

        drop(live.destroy(kept));
        assert!(session.handles().is_empty());
        assert_eq!(session.len(), 0);
        assert!(session.is_empty());
        orphaned.release(lost);
    }

    #[test]
    fn dropped_namespace_stops_counting() {
        let namespace = Namespace::builder("files").build().expect("namespace");
        let table = ObjectTable::new(Arc::downgrade(&namespace), 4);
        let session = Session::new();
        let reference = table.create(&session, FILE_TYPE, 1).expect("create");
        assert_eq!(session.len(), 1);

        drop(namespace);
        assert!(session.handles().is_empty());
        assert_eq!(session.len(), 0);
        assert!(session.is_empty());
        table.release(reference);
    }
}
