//! The namespace manager, always registered as namespace 0.
//!
//! It reserves operation codes `0..OP_RANGE` and exposes a single query
//! operation. The query's request format is checked, but the query itself is
//! not implemented and always reports [`DispatchError::Unsupported`].

use std::sync::Arc;

use crate::dispatch::Invocation;
use crate::error::DispatchError;
use crate::namespace::{Descriptor, Namespace, OperationFlags};
use crate::request::Request;
use crate::wire::{AttributeId, IOVEC_LEN};

/// Registry id of the namespace manager.
pub const NAMESPACE_MANAGER_ID: u16 = 0;
/// Display name of the namespace manager.
pub const NAMESPACE_MANAGER_NAME: &str = "namespace manager";
/// Operation code of the namespace query.
pub const NAMESPACE_QUERY: u32 = 0;

pub(crate) fn namespace_manager() -> Arc<Namespace> {
    Namespace::builder(NAMESPACE_MANAGER_NAME)
        .op_base(NAMESPACE_QUERY)
        .operation(
            Descriptor::new("namespace query", OperationFlags::empty(), query)
                .with_check(check_query),
        )
        .assemble()
}

/// A query takes no flags, no objects, and one iovec argument.
fn check_query(request: &Request) -> Result<(), DispatchError> {
    if request.flags() != 0 {
        return Err(DispatchError::invalid_request(
            "namespace query takes no flags",
        ));
    }
    if !request.objects().is_empty() {
        return Err(DispatchError::invalid_request(
            "namespace query takes no objects",
        ));
    }
    match request.arguments() {
        [argument] if argument.is(AttributeId::Iovec, IOVEC_LEN) => Ok(()),
        _ => Err(DispatchError::invalid_request(
            "namespace query takes exactly one iovec argument",
        )),
    }
}

fn query(_invocation: &mut Invocation<'_>) -> Result<i64, DispatchError> {
    Err(DispatchError::unsupported("namespace query"))
}
