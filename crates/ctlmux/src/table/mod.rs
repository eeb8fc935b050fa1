//! Per-namespace handle table and the exclusivity protocol.
//!
//! The [`ObjectTable`] owns every object of its namespace and hands out
//! [`ObjectRef`] tokens for transient use. All state lives behind one mutex:
//! looking up an entry, checking its exclusive flag and use count, and
//! updating both happen under a single guard, so no caller can observe or
//! act on a half-applied acquisition. The guard is only held for the table
//! operation itself; handlers never run under it.
//!
//! Handle ids are allocated smallest-free-first and may be reused once an
//! object is destroyed. Every object also carries a process-unique serial so
//! an [`ObjectKey`] captured from an old reference never resolves to a newer
//! object that happens to reuse the numeric id.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ctlmux_config::LogArea;
use tracing::debug;

use crate::error::DispatchError;
use crate::namespace::Namespace;
use crate::session::{Session, SessionId, SessionLink};
use crate::wire::ObjectId;

/// Tracing target for handle table operations.
pub(crate) const TABLE_TARGET: &str = LogArea::Table.target();

/// Opaque provider state attached to an object.
pub type ProviderContext = Arc<dyn Any + Send + Sync>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Token for one live acquisition of an object.
///
/// A reference is produced by [`ObjectTable::acquire`] or
/// [`ObjectTable::create`] and must be handed back through
/// [`ObjectTable::release`] or [`ObjectTable::destroy`]. It is deliberately
/// not `Clone`: one token accounts for exactly one use.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an object reference must be released or destroyed"]
pub struct ObjectRef {
    handle: u32,
    type_tag: u16,
    app_context: u64,
    serial: u64,
    exclusive: bool,
}

impl ObjectRef {
    /// Handle id of the object.
    #[must_use]
    pub const fn handle(&self) -> u32 {
        self.handle
    }

    /// Type tag of the object.
    #[must_use]
    pub const fn type_tag(&self) -> u16 {
        self.type_tag
    }

    /// Application context supplied when the object was opened.
    #[must_use]
    pub const fn app_context(&self) -> u64 {
        self.app_context
    }

    /// Returns true when this acquisition holds the object exclusively.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Stable key identifying this exact object instance.
    #[must_use]
    pub const fn key(&self) -> ObjectKey {
        ObjectKey {
            handle: self.handle,
            serial: self.serial,
        }
    }

    /// Caller-visible id of the object.
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        ObjectId::new(self.handle, self.type_tag)
    }
}

/// Copyable identity of one object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    handle: u32,
    serial: u64,
}

impl ObjectKey {
    pub(crate) const fn from_link(link: &SessionLink) -> Self {
        Self {
            handle: link.handle,
            serial: link.serial,
        }
    }

    /// Handle id the object had.
    #[must_use]
    pub const fn handle(self) -> u32 {
        self.handle
    }
}

/// Point-in-time view of an object's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Handle id.
    pub handle: u32,
    /// Type tag.
    pub type_tag: u16,
    /// Owning session.
    pub owner: SessionId,
    /// Application context supplied at open time.
    pub app_context: u64,
    /// Whether an acquisition currently holds the object exclusively.
    pub exclusive: bool,
    /// Number of live acquisitions.
    pub use_count: u32,
}

/// An object removed from its table.
pub struct RetiredObject {
    /// Handle id the object had.
    pub handle: u32,
    /// Type tag of the object.
    pub type_tag: u16,
    /// Session that owned the object.
    pub owner: SessionId,
    /// Application context supplied at open time.
    pub app_context: u64,
    /// Provider state that was attached, if any.
    pub provider_context: Option<ProviderContext>,
}

impl RetiredObject {
    /// Caller-visible id the object had.
    #[must_use]
    pub const fn object_id(&self) -> ObjectId {
        ObjectId::new(self.handle, self.type_tag)
    }
}

impl std::fmt::Debug for RetiredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetiredObject")
            .field("handle", &self.handle)
            .field("type_tag", &self.type_tag)
            .field("owner", &self.owner)
            .field("app_context", &self.app_context)
            .field("provider_context", &self.provider_context.is_some())
            .finish()
    }
}

struct ObjectEntry {
    serial: u64,
    type_tag: u16,
    owner: SessionId,
    session: Weak<Session>,
    app_context: u64,
    provider: Option<ProviderContext>,
    exclusive: bool,
    use_count: u32,
}

impl ObjectEntry {
    const fn info(&self, handle: u32) -> ObjectInfo {
        ObjectInfo {
            handle,
            type_tag: self.type_tag,
            owner: self.owner,
            app_context: self.app_context,
            exclusive: self.exclusive,
            use_count: self.use_count,
        }
    }

    fn retire(self, handle: u32) -> RetiredObject {
        if let Some(session) = self.session.upgrade() {
            session.unlink(self.serial);
        }
        RetiredObject {
            handle,
            type_tag: self.type_tag,
            owner: self.owner,
            app_context: self.app_context,
            provider_context: self.provider,
        }
    }
}

// Free ids below `next` are kept in `free`, so the smallest free id is either
// the first element of `free` or `next` itself.
#[derive(Default)]
struct TableState {
    objects: BTreeMap<u32, ObjectEntry>,
    free: BTreeSet<u32>,
    next: u32,
}

impl TableState {
    fn acquire(
        &mut self,
        owner: SessionId,
        handle: u32,
        expected_type: u16,
        exclusive: bool,
    ) -> Result<ObjectRef, DispatchError> {
        let entry = self
            .objects
            .get_mut(&handle)
            .ok_or(DispatchError::HandleNotFound { handle })?;

        if entry.type_tag != expected_type {
            return Err(DispatchError::TypeMismatch {
                handle,
                expected: expected_type,
                actual: entry.type_tag,
            });
        }
        if entry.owner != owner {
            return Err(DispatchError::OwnershipMismatch { handle });
        }
        if entry.exclusive || (exclusive && entry.use_count > 0) {
            return Err(DispatchError::Busy { handle });
        }

        entry.use_count = entry
            .use_count
            .checked_add(1)
            .ok_or(DispatchError::ResourceExhausted {
                resource: "handle use count",
            })?;
        if exclusive {
            entry.exclusive = true;
        }

        Ok(ObjectRef {
            handle,
            type_tag: entry.type_tag,
            app_context: entry.app_context,
            serial: entry.serial,
            exclusive,
        })
    }

    fn release(&mut self, reference: &ObjectRef) {
        let Some(entry) = self.objects.get_mut(&reference.handle) else {
            return;
        };
        if entry.serial != reference.serial {
            return;
        }
        if reference.exclusive {
            entry.exclusive = false;
        }
        entry.use_count = entry.use_count.saturating_sub(1);
    }

    fn allocate_handle(&mut self) -> Option<u32> {
        if let Some(handle) = self.free.pop_first() {
            return Some(handle);
        }
        let handle = self.next;
        self.next = handle.checked_add(1)?;
        Some(handle)
    }

    fn remove(&mut self, handle: u32) -> Option<ObjectEntry> {
        let entry = self.objects.remove(&handle)?;
        self.free.insert(handle);
        while let Some(&last) = self.free.last() {
            if last.checked_add(1) != Some(self.next) {
                break;
            }
            self.free.pop_last();
            self.next = last;
        }
        Some(entry)
    }

    fn take_all(&mut self) -> BTreeMap<u32, ObjectEntry> {
        self.free.clear();
        self.next = 0;
        std::mem::take(&mut self.objects)
    }
}

/// Allocator and map from handle id to object for one namespace.
pub struct ObjectTable {
    owner: Weak<Namespace>,
    capacity: u32,
    state: Mutex<TableState>,
}

impl std::fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTable")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl ObjectTable {
    pub(crate) fn new(owner: Weak<Namespace>, capacity: u32) -> Self {
        Self {
            owner,
            capacity,
            state: Mutex::new(TableState::default()),
        }
    }

    /// Maximum number of live objects.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().objects.len()
    }

    /// Returns true when the table holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().objects.is_empty()
    }

    /// Acquires one object for the calling session.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandleNotFound`] if no object has this handle.
    /// - [`DispatchError::TypeMismatch`] if the stored type tag differs.
    /// - [`DispatchError::OwnershipMismatch`] if another session owns it.
    /// - [`DispatchError::Busy`] if it is held exclusively, or if exclusive
    ///   access was requested while any use is live.
    ///
    /// A failed acquisition leaves the object untouched.
    pub fn acquire(
        &self,
        session: &Session,
        handle: u32,
        expected_type: u16,
        exclusive: bool,
    ) -> Result<ObjectRef, DispatchError> {
        self.lock_state()
            .acquire(session.id(), handle, expected_type, exclusive)
    }

    /// Acquires every id in order, exclusive only for the first when asked.
    ///
    /// The whole mapping happens under one guard. If any acquisition fails,
    /// the ones already made are released in reverse order before the error is
    /// returned, so the table is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns the first acquisition error, see [`ObjectTable::acquire`].
    pub fn acquire_all(
        &self,
        session: &Session,
        ids: &[ObjectId],
        exclusive_first: bool,
    ) -> Result<Vec<ObjectRef>, DispatchError> {
        let mut state = self.lock_state();
        let mut mapped = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            let exclusive = exclusive_first && index == 0;
            match state.acquire(session.id(), id.handle, id.type_tag, exclusive) {
                Ok(reference) => mapped.push(reference),
                Err(error) => {
                    while let Some(reference) = mapped.pop() {
                        state.release(&reference);
                    }
                    return Err(error);
                }
            }
        }
        Ok(mapped)
    }

    /// Gives back one acquisition.
    pub fn release(&self, reference: ObjectRef) {
        self.lock_state().release(&reference);
    }

    /// Gives back several acquisitions, last acquired first.
    pub fn release_all(&self, references: Vec<ObjectRef>) {
        let mut state = self.lock_state();
        for reference in references.into_iter().rev() {
            state.release(&reference);
        }
    }

    /// Creates an object owned by `session`, held exclusively by the caller.
    ///
    /// The object starts with a use count of one and is linked into the
    /// session's enumeration list.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ResourceExhausted`] when the table is at
    /// capacity or the id space is used up.
    pub fn create(
        &self,
        session: &Arc<Session>,
        type_tag: u16,
        app_context: u64,
    ) -> Result<ObjectRef, DispatchError> {
        let exhausted = DispatchError::ResourceExhausted {
            resource: "handle table",
        };
        let mut state = self.lock_state();
        let at_capacity = u32::try_from(state.objects.len())
            .map_or(true, |live| live >= self.capacity);
        if at_capacity {
            return Err(exhausted);
        }
        let handle = state.allocate_handle().ok_or(exhausted)?;
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);

        state.objects.insert(
            handle,
            ObjectEntry {
                serial,
                type_tag,
                owner: session.id(),
                session: Arc::downgrade(session),
                app_context,
                provider: None,
                exclusive: true,
                use_count: 1,
            },
        );
        session.link(SessionLink {
            namespace: self.owner.clone(),
            serial,
            handle,
            type_tag,
        });

        debug!(
            target: TABLE_TARGET,
            handle,
            type_tag,
            session = session.id().get(),
            "object created"
        );

        Ok(ObjectRef {
            handle,
            type_tag,
            app_context,
            serial,
            exclusive: true,
        })
    }

    /// Removes the object behind an exclusively held reference.
    ///
    /// The caller must hold `reference` exclusively and must not have released
    /// it; the table trusts that and does not re-check the use count. Returns
    /// `None`, leaving the table untouched, when `reference` is not exclusive
    /// or its object is already gone. The numeric handle may by then name a
    /// newer object, which is left alone.
    pub fn destroy(&self, reference: ObjectRef) -> Option<RetiredObject> {
        if !reference.exclusive {
            return None;
        }
        let mut state = self.lock_state();
        let current = state.objects.get(&reference.handle)?;
        if current.serial != reference.serial {
            drop(state);
            debug!(
                target: TABLE_TARGET,
                handle = reference.handle,
                "stale destroy ignored"
            );
            return None;
        }
        let retired = state.remove(reference.handle)?.retire(reference.handle);
        drop(state);

        debug!(
            target: TABLE_TARGET,
            handle = retired.handle,
            type_tag = retired.type_tag,
            "object destroyed"
        );
        Some(retired)
    }

    /// Removes an object nobody is using.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandleNotFound`] if `key` no longer names a live
    ///   object.
    /// - [`DispatchError::Busy`] if any acquisition is still live.
    pub fn destroy_idle(&self, key: ObjectKey) -> Result<RetiredObject, DispatchError> {
        let mut state = self.lock_state();
        let entry = state
            .objects
            .get(&key.handle)
            .filter(|entry| entry.serial == key.serial)
            .ok_or(DispatchError::HandleNotFound { handle: key.handle })?;
        if entry.use_count > 0 {
            return Err(DispatchError::Busy { handle: key.handle });
        }
        state
            .remove(key.handle)
            .map(|removed| removed.retire(key.handle))
            .ok_or(DispatchError::HandleNotFound { handle: key.handle })
    }

    /// Removes every object regardless of use, returning them in handle order.
    pub fn drain(&self) -> Vec<RetiredObject> {
        let objects = self.lock_state().take_all();
        objects
            .into_iter()
            .map(|(handle, entry)| entry.retire(handle))
            .collect()
    }

    /// Looks up the exact object instance identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::HandleNotFound`] once that instance has been
    /// destroyed, even if its handle id now names a different object.
    pub fn object(&self, key: ObjectKey) -> Result<ObjectInfo, DispatchError> {
        self.lock_state()
            .objects
            .get(&key.handle)
            .filter(|entry| entry.serial == key.serial)
            .map(|entry| entry.info(key.handle))
            .ok_or(DispatchError::HandleNotFound { handle: key.handle })
    }

    /// Looks up whatever object currently carries `handle`.
    #[must_use]
    pub fn lookup(&self, handle: u32) -> Option<ObjectInfo> {
        self.lock_state()
            .objects
            .get(&handle)
            .map(|entry| entry.info(handle))
    }

    /// Attaches provider state to a held object, returning what was there.
    pub fn set_provider_context(
        &self,
        reference: &ObjectRef,
        context: ProviderContext,
    ) -> Option<ProviderContext> {
        let mut state = self.lock_state();
        let entry = state
            .objects
            .get_mut(&reference.handle)
            .filter(|entry| entry.serial == reference.serial)?;
        entry.provider.replace(context)
    }

    /// Returns the provider state attached to a held object.
    #[must_use]
    pub fn provider_context(&self, reference: &ObjectRef) -> Option<ProviderContext> {
        self.lock_state()
            .objects
            .get(&reference.handle)
            .filter(|entry| entry.serial == reference.serial)
            .and_then(|entry| entry.provider.clone())
    }

    // Every mutation completes under the guard; a poisoned table is consistent.
    fn lock_state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
