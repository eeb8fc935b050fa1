//! Table of registered namespaces.
//!
//! Registration and removal take the write lock; lookups take the read lock
//! and hand out an `Arc`, so a request keeps its namespace alive even if the
//! namespace is removed while the request is in flight. Object tables are
//! never touched while the registry lock is held.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ctlmux_config::LogArea;
use tracing::info;

use crate::error::DispatchError;
use crate::manager;
use crate::namespace::Namespace;
use crate::wire::MAX_NAMESPACES;

/// Tracing target for registry events.
pub(crate) const REGISTRY_TARGET: &str = LogArea::Registry.target();

/// Summary of one registered namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSummary {
    /// Registry id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// First operation code.
    pub op_base: u32,
    /// Number of operation codes.
    pub op_count: u32,
    /// Whether the namespace only accepts close operations.
    pub closed: bool,
    /// Number of live objects.
    pub objects: usize,
}

#[derive(Debug)]
struct RegistryState {
    slots: Vec<Option<Arc<Namespace>>>,
    high_water: usize,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            slots: vec![None; MAX_NAMESPACES],
            high_water: 0,
        }
    }

    fn shrink_high_water(&mut self) {
        while self.high_water > 0
            && self
                .slots
                .get(self.high_water - 1)
                .is_some_and(Option::is_none)
        {
            self.high_water -= 1;
        }
    }
}

/// Fixed-capacity registry mapping small ids to namespaces.
#[derive(Debug)]
pub struct NamespaceRegistry {
    state: RwLock<RegistryState>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::new()),
        }
    }

    /// Creates a registry with the namespace manager in slot 0.
    #[must_use]
    pub fn with_namespace_manager() -> Self {
        let registry = Self::new();
        {
            let mut state = registry.write_state();
            let namespace = manager::namespace_manager();
            namespace.assign_id(manager::NAMESPACE_MANAGER_ID);
            if let Some(slot) = state
                .slots
                .get_mut(usize::from(manager::NAMESPACE_MANAGER_ID))
            {
                *slot = Some(namespace);
            }
            state.high_water = usize::from(manager::NAMESPACE_MANAGER_ID) + 1;
        }
        registry
    }

    /// Maximum number of namespaces.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        MAX_NAMESPACES
    }

    /// Number of registered namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().slots.iter().flatten().count()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the highest occupied slot.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.read_state().high_water
    }

    /// Registers a namespace in the smallest free slot and returns its id.
    ///
    /// Registration reopens a namespace that was closed.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidRequest`] if the namespace is already
    ///   registered.
    /// - [`DispatchError::ResourceExhausted`] if every slot is taken.
    pub fn register(&self, namespace: Arc<Namespace>) -> Result<u16, DispatchError> {
        let exhausted = DispatchError::ResourceExhausted {
            resource: "namespace table",
        };
        let mut state = self.write_state();
        if let Some(id) = namespace.id() {
            return Err(DispatchError::invalid_request(format!(
                "namespace '{}' is already registered as {id}",
                namespace.name()
            )));
        }
        let index = state
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| exhausted.clone())?;
        let id = u16::try_from(index).map_err(|_| exhausted)?;

        namespace.assign_id(id);
        info!(
            target: REGISTRY_TARGET,
            id,
            name = namespace.name(),
            op_base = namespace.op_base(),
            op_count = namespace.op_count(),
            "namespace registered"
        );
        if let Some(slot) = state.slots.get_mut(index) {
            *slot = Some(namespace);
        }
        state.high_water = state.high_water.max(index + 1);
        Ok(id)
    }

    /// Removes a namespace and tears down its remaining objects.
    ///
    /// The namespace is closed before its slot is cleared. Requests that
    /// resolved it earlier keep running against it; only close operations
    /// are admitted from then on. Once the slot is cleared and the lock
    /// dropped, every live object is removed and passed to the namespace's
    /// teardown routine. Returns how many objects were torn down.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidRequest`] if the namespace is not registered.
    /// - [`DispatchError::NamespaceNotFound`] if its slot holds a different
    ///   namespace.
    pub fn unregister(&self, namespace: &Namespace) -> Result<usize, DispatchError> {
        let id = namespace.id().ok_or_else(|| {
            DispatchError::invalid_request(format!(
                "namespace '{}' is not registered",
                namespace.name()
            ))
        })?;
        {
            let mut state = self.write_state();
            let slot = state
                .slots
                .get_mut(usize::from(id))
                .filter(|slot| {
                    slot.as_ref()
                        .is_some_and(|current| std::ptr::eq(current.as_ref(), namespace))
                })
                .ok_or(DispatchError::NamespaceNotFound { namespace: id })?;
            namespace.close();
            *slot = None;
            state.shrink_high_water();
            namespace.clear_id();
        }
        info!(
            target: REGISTRY_TARGET,
            id,
            name = namespace.name(),
            "namespace unregistered"
        );
        Ok(namespace.teardown_all())
    }

    /// Resolves a namespace id.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NamespaceNotFound`] if the slot is empty or
    /// out of range.
    pub fn lookup(&self, id: u16) -> Result<Arc<Namespace>, DispatchError> {
        self.read_state()
            .slots
            .get(usize::from(id))
            .and_then(Option::clone)
            .ok_or(DispatchError::NamespaceNotFound { namespace: id })
    }

    /// Lists registered namespaces in id order.
    #[must_use]
    pub fn namespaces(&self) -> Vec<NamespaceSummary> {
        let registered: Vec<(u16, Arc<Namespace>)> = {
            let state = self.read_state();
            state
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let id = u16::try_from(index).ok()?;
                    slot.clone().map(|namespace| (id, namespace))
                })
                .collect()
        };
        registered
            .into_iter()
            .map(|(id, namespace)| NamespaceSummary {
                id,
                name: namespace.name().to_owned(),
                op_base: namespace.op_base(),
                op_count: namespace.op_count(),
                closed: namespace.is_closed(),
                objects: namespace.table().len(),
            })
            .collect()
    }

    // Slot updates are single assignments; a poisoned registry is intact.
    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
