//! Namespaces and their operation descriptors.
//!
//! A [`Namespace`] is what a resource provider registers: a display name, a
//! contiguous block of operation codes, one [`Descriptor`] per code, a handle
//! table, and an optional teardown routine for objects still alive when the
//! namespace is removed.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;
use tracing::warn;

use ctlmux_config::{Config, DEFAULT_HANDLE_CAPACITY, LogArea};

use crate::dispatch::Invocation;
use crate::error::DispatchError;
use crate::request::Request;
use crate::table::{ObjectRef, ObjectTable, RetiredObject};
use crate::wire::{MAX_NAME_LEN, OP_RANGE};

/// Tracing target for namespace lifecycle events.
pub(crate) const NAMESPACE_TARGET: &str = LogArea::Namespace.target();

const UNREGISTERED: u32 = u32::MAX;

bitflags! {
    /// Behaviour flags of one operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OperationFlags: u32 {
        /// The operation allocates a new object.
        const CREATES = 1 << 0;
        /// The operation destroys the object it names.
        const DESTROYS = 1 << 1;
        /// The first named object must be held exclusively.
        const EXCLUSIVE = 1 << 2;
        /// The operation may generate events for its objects.
        const EVENTS = 1 << 3;
    }
}

/// Provider function run for one operation.
///
/// The returned status becomes the status of the control call.
pub type HandlerFn = dyn Fn(&mut Invocation<'_>) -> Result<i64, DispatchError> + Send + Sync;

/// Precondition evaluated when an operation is looked up.
pub type CheckFn = fn(&Request) -> Result<(), DispatchError>;

/// Check run once the request's objects are mapped and any new object is
/// allocated. It sees the mapped objects, a created object last.
pub type ArgumentCheckFn = fn(&Request, &[ObjectRef]) -> Result<(), DispatchError>;

/// Routine invoked for each object still alive when its namespace goes away.
pub type TeardownFn = dyn Fn(&Namespace, RetiredObject) + Send + Sync;

/// Static metadata for one operation.
pub struct Descriptor {
    name: String,
    flags: OperationFlags,
    handler: Box<HandlerFn>,
    check: Option<CheckFn>,
    argument_check: Option<ArgumentCheckFn>,
}

impl Descriptor {
    /// Creates a descriptor.
    ///
    /// A destroying operation always requires exclusive access, so
    /// [`OperationFlags::DESTROYS`] implies [`OperationFlags::EXCLUSIVE`].
    pub fn new<F>(name: impl Into<String>, flags: OperationFlags, handler: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<i64, DispatchError> + Send + Sync + 'static,
    {
        let mut effective = flags;
        if effective.contains(OperationFlags::DESTROYS) {
            effective |= OperationFlags::EXCLUSIVE;
        }
        Self {
            name: name.into(),
            flags: effective,
            handler: Box::new(handler),
            check: None,
            argument_check: None,
        }
    }

    /// Attaches a precondition checked before any object is mapped.
    #[must_use]
    pub fn with_check(mut self, check: CheckFn) -> Self {
        self.check = Some(check);
        self
    }

    /// Attaches a check run after mapping and allocation, just before the
    /// handler. A failing check unwinds the call, destroying any object
    /// created for it.
    #[must_use]
    pub fn with_argument_check(mut self, check: ArgumentCheckFn) -> Self {
        self.argument_check = Some(check);
        self
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Behaviour flags.
    #[must_use]
    pub const fn flags(&self) -> OperationFlags {
        self.flags
    }

    /// Whether the operation allocates a new object.
    #[must_use]
    pub const fn creates(&self) -> bool {
        self.flags.contains(OperationFlags::CREATES)
    }

    /// Whether the operation destroys the object it names.
    #[must_use]
    pub const fn destroys(&self) -> bool {
        self.flags.contains(OperationFlags::DESTROYS)
    }

    /// Whether the first named object is mapped exclusively.
    #[must_use]
    pub const fn requires_exclusive(&self) -> bool {
        self.flags.contains(OperationFlags::EXCLUSIVE)
    }

    /// Whether the operation may generate events.
    #[must_use]
    pub const fn emits_events(&self) -> bool {
        self.flags.contains(OperationFlags::EVENTS)
    }

    pub(crate) fn check(&self, request: &Request) -> Result<(), DispatchError> {
        self.check.map_or(Ok(()), |check| check(request))
    }

    pub(crate) fn check_arguments(
        &self,
        request: &Request,
        objects: &[ObjectRef],
    ) -> Result<(), DispatchError> {
        self.argument_check
            .map_or(Ok(()), |check| check(request, objects))
    }

    pub(crate) fn invoke(&self, invocation: &mut Invocation<'_>) -> Result<i64, DispatchError> {
        (self.handler)(invocation)
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("check", &self.check.is_some())
            .field("argument_check", &self.argument_check.is_some())
            .finish_non_exhaustive()
    }
}

/// Errors raised while assembling a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    /// The display name is empty.
    #[error("namespace name is empty")]
    EmptyName,
    /// The display name exceeds [`MAX_NAME_LEN`] bytes.
    #[error("namespace name '{name}' is {len} bytes; the limit is {limit}", limit = MAX_NAME_LEN)]
    NameTooLong {
        /// Offending name.
        name: String,
        /// Its length in bytes.
        len: usize,
    },
    /// More operations than fit in one block of [`OP_RANGE`] codes.
    #[error("{count} operations exceed the {limit} codes available to a namespace", limit = OP_RANGE)]
    TooManyOperations {
        /// Number of operations supplied.
        count: usize,
    },
    /// The operation block would run past the end of the code space.
    #[error("operation base {base} leaves no room for {count} operations")]
    OperationRangeOverflow {
        /// Requested base.
        base: u32,
        /// Number of operations.
        count: u32,
    },
    /// An operation both creates and destroys an object.
    #[error("operation '{operation}' cannot both create and destroy an object")]
    ConflictingFlags {
        /// Operation name.
        operation: String,
    },
    /// The handle table would not accept any object.
    #[error("handle capacity must be at least one")]
    ZeroHandleCapacity,
}

/// Builder for [`Namespace`].
pub struct NamespaceBuilder {
    name: String,
    op_base: u32,
    descriptors: Vec<Descriptor>,
    teardown: Option<Box<TeardownFn>>,
    handle_capacity: u32,
}

impl NamespaceBuilder {
    /// Sets the first operation code of the namespace.
    #[must_use]
    pub fn op_base(mut self, base: u32) -> Self {
        self.op_base = base;
        self
    }

    /// Appends the descriptor for the next operation code.
    #[must_use]
    pub fn operation(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Sets the routine run for objects left alive at removal.
    #[must_use]
    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&Namespace, RetiredObject) + Send + Sync + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Limits how many objects the namespace's table holds at once.
    #[must_use]
    pub fn handle_capacity(mut self, capacity: u32) -> Self {
        self.handle_capacity = capacity;
        self
    }

    /// Applies host configuration defaults.
    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        self.handle_capacity(config.handle_capacity())
    }

    /// Validates the namespace and assembles it.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError`] when the name, operation block, flags, or
    /// capacity are unusable.
    pub fn build(self) -> Result<Arc<Namespace>, NamespaceError> {
        if self.name.is_empty() {
            return Err(NamespaceError::EmptyName);
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(NamespaceError::NameTooLong {
                len: self.name.len(),
                name: self.name,
            });
        }
        let count = u32::try_from(self.descriptors.len())
            .ok()
            .filter(|count| *count <= OP_RANGE)
            .ok_or(NamespaceError::TooManyOperations {
                count: self.descriptors.len(),
            })?;
        if self.op_base.checked_add(count).is_none() {
            return Err(NamespaceError::OperationRangeOverflow {
                base: self.op_base,
                count,
            });
        }
        if let Some(conflict) = self
            .descriptors
            .iter()
            .find(|descriptor| descriptor.creates() && descriptor.destroys())
        {
            return Err(NamespaceError::ConflictingFlags {
                operation: conflict.name().to_owned(),
            });
        }
        if self.handle_capacity == 0 {
            return Err(NamespaceError::ZeroHandleCapacity);
        }
        Ok(self.assemble())
    }

    pub(crate) fn assemble(self) -> Arc<Namespace> {
        Arc::new_cyclic(|owner| Namespace {
            name: self.name,
            id: AtomicU32::new(UNREGISTERED),
            closed: AtomicBool::new(false),
            op_base: self.op_base,
            descriptors: self.descriptors,
            teardown: self.teardown,
            table: ObjectTable::new(owner.clone(), self.handle_capacity),
        })
    }
}

/// A registered subsystem exposing handles through the dispatcher.
pub struct Namespace {
    name: String,
    id: AtomicU32,
    closed: AtomicBool,
    op_base: u32,
    descriptors: Vec<Descriptor>,
    teardown: Option<Box<TeardownFn>>,
    table: ObjectTable,
}

impl Namespace {
    /// Starts building a namespace with the given display name.
    pub fn builder(name: impl Into<String>) -> NamespaceBuilder {
        NamespaceBuilder {
            name: name.into(),
            op_base: 0,
            descriptors: Vec::new(),
            teardown: None,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
        }
    }

    /// Registry id, while registered.
    #[must_use]
    pub fn id(&self) -> Option<u16> {
        u16::try_from(self.id.load(Ordering::Acquire)).ok()
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First operation code.
    #[must_use]
    pub const fn op_base(&self) -> u32 {
        self.op_base
    }

    /// Number of operation codes.
    #[must_use]
    pub fn op_count(&self) -> u32 {
        u32::try_from(self.descriptors.len()).unwrap_or(OP_RANGE)
    }

    /// The namespace's handle table.
    #[must_use]
    pub const fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Whether the namespace only accepts close operations.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting anything but close operations.
    ///
    /// The namespace stays registered, so callers can still release the
    /// handles they hold. Unregistering closes it as well.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Descriptor for an absolute operation code.
    #[must_use]
    pub fn descriptor(&self, op: u32) -> Option<&Descriptor> {
        let index = op.checked_sub(self.op_base)?;
        self.descriptors.get(usize::try_from(index).ok()?)
    }

    /// Resolves the descriptor for a parsed request and runs its precondition.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoSuchOperation`] if the operation code lies outside
    ///   this namespace's block.
    /// - Whatever the descriptor's precondition reports.
    pub fn resolve(&self, request: &Request) -> Result<&Descriptor, DispatchError> {
        let descriptor =
            self.descriptor(request.op())
                .ok_or(DispatchError::NoSuchOperation {
                    namespace: request.namespace_id(),
                    op: request.op(),
                })?;
        descriptor.check(request)?;
        Ok(descriptor)
    }

    pub(crate) fn assign_id(&self, id: u16) {
        self.id.store(u32::from(id), Ordering::Release);
        self.closed.store(false, Ordering::Release);
    }

    pub(crate) fn clear_id(&self) {
        self.id.store(UNREGISTERED, Ordering::Release);
    }

    /// Runs the teardown routine for an object removed outside a close call.
    pub(crate) fn retire(&self, object: RetiredObject) {
        if let Some(teardown) = &self.teardown {
            teardown(self, object);
        }
    }

    /// Removes every live object, running the teardown routine for each.
    pub(crate) fn teardown_all(&self) -> usize {
        let retired = self.table.drain();
        let count = retired.len();
        if count > 0 {
            warn!(
                target: NAMESPACE_TARGET,
                namespace = self.name.as_str(),
                objects = count,
                "tearing down live objects"
            );
        }
        for object in retired {
            self.retire(object);
        }
        count
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .field("op_base", &self.op_base)
            .field("descriptors", &self.descriptors)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
