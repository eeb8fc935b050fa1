//! Multiplexed control-call dispatch for handle-based resource providers.
//!
//! `ctlmux` sits between callers and a set of resource providers. A provider
//! registers a [`Namespace`]: a block of operation codes, one
//! [`Descriptor`] per code, and a handle table for the objects it hands out.
//! Callers issue a single binary control call naming a namespace, an
//! operation, the objects it acts on, and a list of attribute arguments.
//!
//! The [`Dispatcher`] validates the whole request before anything changes,
//! maps every named object for the calling [`Session`] (checking type,
//! ownership, and exclusivity), allocates the new object for an opening
//! operation, runs the handler, and then releases or destroys the mapped
//! objects and writes their ids back. A failure before the handler runs
//! leaves every table exactly as it was.
//!
//! # Example
//!
//! ```rust
//! use ctlmux::{
//!     Descriptor, Dispatcher, Invocation, Namespace, OperationFlags, RequestBuilder, Session,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files = Namespace::builder("files")
//!     .op_base(128)
//!     .operation(Descriptor::new(
//!         "open",
//!         OperationFlags::CREATES,
//!         |call: &mut Invocation<'_>| {
//!             let handle = call.created().map_or(0, |file| file.handle());
//!             Ok(i64::from(handle))
//!         },
//!     ))
//!     .build()?;
//!
//! let dispatcher = Dispatcher::new();
//! let id = dispatcher.registry().register(files)?;
//! let session = Session::new();
//!
//! let request = RequestBuilder::new(id, 128)
//!     .session_context(7, 0x1122_3344_5566_7788)
//!     .build()?;
//! let response = dispatcher.dispatch(&session, &request)?;
//! assert_eq!(response.objects().len(), 1);
//! assert_eq!(session.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod namespace;
pub mod registry;
pub mod request;
pub mod session;
pub mod table;
pub mod telemetry;
pub mod wire;

#[cfg(test)]
mod tests;

pub use self::dispatch::{Dispatcher, Invocation, Response, SessionRelease};
pub use self::error::{DispatchError, ErrorKind};
pub use self::namespace::{
    Descriptor, Namespace, NamespaceBuilder, NamespaceError, OperationFlags,
};
pub use self::registry::{NamespaceRegistry, NamespaceSummary};
pub use self::request::{Request, RequestBuilder};
pub use self::session::{Session, SessionHandle, SessionId};
pub use self::table::{ObjectInfo, ObjectKey, ObjectRef, ObjectTable, RetiredObject};
pub use self::wire::{AttributeId, ObjectId};
