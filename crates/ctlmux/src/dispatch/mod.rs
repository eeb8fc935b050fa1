//! Control-call dispatch.
//!
//! The [`Dispatcher`] turns one caller buffer into one handler invocation:
//!
//! 1. parse and validate the request,
//! 2. resolve the namespace and the operation descriptor,
//! 3. admit the request against the operation's flags,
//! 4. map every named object (exclusive first object when required),
//! 5. create the new object for an opening operation,
//! 6. run the operation's argument check,
//! 7. run the handler,
//! 8. post-process: destroy or release the mapped objects and write their
//!    final ids back into the response.
//!
//! Any failure before the handler runs unwinds steps 4 and 5 completely.
//! Post-processing always runs once the handler has been called, whatever the
//! handler returned.

mod invocation;
mod response;
mod transaction;

pub use self::invocation::Invocation;
pub use self::response::Response;

use std::sync::Arc;

use ctlmux_config::LogArea;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::namespace::Descriptor;
use crate::registry::NamespaceRegistry;
use crate::request::{Admission, Request};
use crate::session::Session;
use crate::table::ObjectKey;
use crate::wire::{Command, HEADER_LEN};

use self::transaction::Transaction;

/// Tracing target for dispatch events.
pub(crate) const DISPATCH_TARGET: &str = LogArea::Dispatch.target();

/// Outcome of [`Dispatcher::release_session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionRelease {
    /// Objects destroyed and handed to their namespace's teardown routine.
    pub destroyed: usize,
    /// Objects left alone because a call was still using them.
    pub busy: usize,
}

/// Routes control calls to namespace operations.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<NamespaceRegistry>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over a fresh registry holding the namespace
    /// manager.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(NamespaceRegistry::with_namespace_manager()))
    }

    /// Creates a dispatcher over an existing registry.
    #[must_use]
    pub const fn with_registry(registry: Arc<NamespaceRegistry>) -> Self {
        Self { registry }
    }

    /// Registry the dispatcher resolves namespaces in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.registry
    }

    /// Entry point for a numbered control command.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Unsupported`] for unstructured (raw) commands.
    /// - [`DispatchError::InvalidRequest`] for unknown command numbers and
    ///   buffers too short to hold a header.
    /// - Anything [`Dispatcher::dispatch`] reports.
    pub fn call(
        &self,
        session: &Arc<Session>,
        command: u8,
        buffer: &[u8],
    ) -> Result<Response, DispatchError> {
        match Command::decode(command) {
            Command::Raw(number) => Err(DispatchError::unsupported(format!(
                "raw command {number}"
            ))),
            Command::Unknown(number) => Err(DispatchError::invalid_request(format!(
                "unknown command {number}"
            ))),
            Command::Structured if buffer.len() < HEADER_LEN => {
                Err(DispatchError::invalid_request(format!(
                    "{} byte buffer is shorter than the {HEADER_LEN} byte header",
                    buffer.len()
                )))
            }
            Command::Structured => self.dispatch(session, buffer),
        }
    }

    /// Executes one structured request on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns the first validation, lookup, or mapping failure, or the
    /// handler's own error. Object state is unchanged by any failure that
    /// happens before the handler runs.
    pub fn dispatch(
        &self,
        session: &Arc<Session>,
        buffer: &[u8],
    ) -> Result<Response, DispatchError> {
        let mut request = Request::parse(buffer)?;
        let namespace = self.registry.lookup(request.namespace_id())?;
        let descriptor = namespace.resolve(&request)?;
        let admission = request.admit(descriptor.flags(), namespace.is_closed())?;

        debug!(
            target: DISPATCH_TARGET,
            namespace = namespace.name(),
            operation = descriptor.name(),
            session = session.id().get(),
            objects = request.objects().len(),
            "dispatching request"
        );

        let mut transaction = Transaction::begin(namespace.table(), session);
        if let Err(error) = prepare(&mut transaction, &request, &admission, descriptor) {
            debug!(
                target: DISPATCH_TARGET,
                operation = descriptor.name(),
                %error,
                "request unwound before handler"
            );
            transaction.abort();
            return Err(error);
        }

        let opened = transaction.created();
        let outcome = {
            let mut invocation = Invocation::new(
                &namespace,
                session,
                &mut request,
                transaction.references(),
                admission.first_argument(),
                opened,
            );
            descriptor.invoke(&mut invocation)
        };

        let reflected = transaction.commit(descriptor.destroys());
        request.reflect(&reflected, opened);

        match outcome {
            Ok(status) => Ok(Response::new(status, request.into_bytes())),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    namespace = namespace.name(),
                    operation = descriptor.name(),
                    %error,
                    "handler failed"
                );
                Err(error)
            }
        }
    }

    /// Destroys every idle object a session still owns.
    ///
    /// Each destroyed object is handed to its namespace's teardown routine.
    /// Objects in use by a call in flight are counted as busy and left alone.
    pub fn release_session(&self, session: &Session) -> SessionRelease {
        let mut summary = SessionRelease::default();
        for link in session.snapshot() {
            let Some(namespace) = link.namespace.upgrade() else {
                continue;
            };
            match namespace.table().destroy_idle(ObjectKey::from_link(&link)) {
                Ok(retired) => {
                    namespace.retire(retired);
                    summary.destroyed += 1;
                }
                Err(DispatchError::Busy { .. }) => summary.busy += 1,
                Err(_) => {}
            }
        }
        if summary.destroyed > 0 || summary.busy > 0 {
            debug!(
                target: DISPATCH_TARGET,
                session = session.id().get(),
                destroyed = summary.destroyed,
                busy = summary.busy,
                "session released"
            );
        }
        summary
    }
}

// Maps the named objects, allocates the new one, then runs the argument
// check. Argument bounds were settled when the request was parsed.
fn prepare(
    transaction: &mut Transaction<'_>,
    request: &Request,
    admission: &Admission,
    descriptor: &Descriptor,
) -> Result<(), DispatchError> {
    transaction.map(request.objects(), descriptor.requires_exclusive())?;
    if let Some(open) = admission.open() {
        transaction.open(open)?;
    }
    descriptor.check_arguments(request, transaction.references())
}
