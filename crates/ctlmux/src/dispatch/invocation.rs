//! Context handed to an operation handler.

use std::sync::Arc;

use crate::namespace::Namespace;
use crate::request::Request;
use crate::session::Session;
use crate::table::{ObjectRef, ProviderContext};
use crate::wire::Argument;

/// Everything a handler may look at or update for one call.
///
/// Objects are already mapped when the handler runs. If the operation
/// creates an object, it is the last entry of [`Invocation::objects`] and is
/// also available through [`Invocation::created`].
pub struct Invocation<'a> {
    namespace: &'a Namespace,
    session: &'a Arc<Session>,
    request: &'a mut Request,
    objects: &'a [ObjectRef],
    first_argument: usize,
    created: bool,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        namespace: &'a Namespace,
        session: &'a Arc<Session>,
        request: &'a mut Request,
        objects: &'a [ObjectRef],
        first_argument: usize,
        created: bool,
    ) -> Self {
        Self {
            namespace,
            session,
            request,
            objects,
            first_argument,
            created,
        }
    }

    /// Namespace serving the call.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        self.namespace
    }

    /// Calling session.
    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        self.session
    }

    /// Absolute operation code.
    #[must_use]
    pub fn op(&self) -> u32 {
        self.request.op()
    }

    /// Caller flags from the request header.
    #[must_use]
    pub fn flags(&self) -> u32 {
        self.request.flags()
    }

    /// Mapped objects, in request order, followed by a created object.
    #[must_use]
    pub const fn objects(&self) -> &[ObjectRef] {
        self.objects
    }

    /// The object created for this call, if the operation opens one.
    #[must_use]
    pub fn created(&self) -> Option<&ObjectRef> {
        if self.created {
            self.objects.last()
        } else {
            None
        }
    }

    /// Operation arguments, excluding a consumed session context.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        self.request
            .arguments()
            .get(self.first_argument..)
            .unwrap_or_default()
    }

    /// Bytes of operation argument `index`.
    #[must_use]
    pub fn argument_bytes(&self, index: usize) -> Option<&[u8]> {
        self.request
            .argument_bytes(self.first_argument.checked_add(index)?)
    }

    /// Writable bytes of operation argument `index`.
    ///
    /// Changes are returned to the caller with the response.
    pub fn argument_bytes_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.request
            .argument_bytes_mut(self.first_argument.checked_add(index)?)
    }

    /// Attaches provider state to one of the call's objects.
    pub fn set_provider_context(
        &self,
        object: &ObjectRef,
        context: ProviderContext,
    ) -> Option<ProviderContext> {
        self.namespace.table().set_provider_context(object, context)
    }

    /// Provider state attached to one of the call's objects.
    #[must_use]
    pub fn provider_context(&self, object: &ObjectRef) -> Option<ProviderContext> {
        self.namespace.table().provider_context(object)
    }
}

impl std::fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("namespace", &self.namespace.name())
            .field("session", &self.session.id())
            .field("op", &self.op())
            .field("objects", &self.objects)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}
