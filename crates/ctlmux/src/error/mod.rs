//! Error taxonomy for control-call dispatch.
//!
//! Every failure the dispatcher can report is a [`DispatchError`] variant
//! carrying enough context to explain the rejection. Callers that only need
//! the coarse classification use [`DispatchError::kind`]; callers bridging to
//! a status-code interface use [`DispatchError::errno`].

use thiserror::Error;

/// Conventional status codes used by [`DispatchError::errno`].
pub mod errno {
    /// No such entry.
    pub const ENOENT: i32 = 2;
    /// Out of memory or allocation space.
    pub const ENOMEM: i32 = 12;
    /// Bad address.
    pub const EFAULT: i32 = 14;
    /// Resource busy.
    pub const EBUSY: i32 = 16;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Function not implemented.
    pub const ENOSYS: i32 = 38;
}

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed lengths, counts, bounds, or reserved fields.
    InvalidRequest,
    /// Unknown or closed namespace, or unknown handle.
    NotFound,
    /// The handle exists but has a different type tag.
    TypeMismatch,
    /// The handle exists but belongs to another session.
    OwnershipMismatch,
    /// Exclusive access is unavailable.
    Busy,
    /// A fixed-capacity table is full.
    ResourceExhausted,
    /// The operation code lies outside the namespace's range.
    NoSuchOperation,
    /// The request path exists but is not implemented.
    Unsupported,
    /// The request could not be copied out of the caller's buffer.
    Fault,
    /// A provider handler reported its own failure.
    Handler,
}

/// Errors surfaced while validating and dispatching a control call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request is structurally malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Description of the violated rule.
        reason: String,
    },

    /// No namespace is registered under the requested id.
    #[error("namespace {namespace} is not registered")]
    NamespaceNotFound {
        /// Namespace id from the request header.
        namespace: u16,
    },

    /// The namespace is closing and only accepts close operations.
    #[error("namespace {namespace} is closed")]
    NamespaceClosed {
        /// Namespace id from the request header.
        namespace: u16,
    },

    /// No live object carries the requested handle id.
    #[error("handle {handle} does not exist")]
    HandleNotFound {
        /// Handle id supplied by the caller.
        handle: u32,
    },

    /// The object's type tag differs from the one the caller supplied.
    #[error("handle {handle} has type {actual}, not {expected}")]
    TypeMismatch {
        /// Handle id supplied by the caller.
        handle: u32,
        /// Type tag supplied by the caller.
        expected: u16,
        /// Type tag stored with the object.
        actual: u16,
    },

    /// The object belongs to a different session.
    #[error("handle {handle} belongs to another session")]
    OwnershipMismatch {
        /// Handle id supplied by the caller.
        handle: u32,
    },

    /// The object is held exclusively, or is in use and exclusivity was asked.
    #[error("handle {handle} is busy")]
    Busy {
        /// Handle id supplied by the caller.
        handle: u32,
    },

    /// A table has no free entry left.
    #[error("{resource} exhausted")]
    ResourceExhausted {
        /// Name of the exhausted table.
        resource: &'static str,
    },

    /// The operation code is outside the namespace's operation range.
    #[error("operation {op} is not provided by namespace {namespace}")]
    NoSuchOperation {
        /// Namespace id from the request header.
        namespace: u16,
        /// Operation code from the request header.
        op: u32,
    },

    /// The request path is recognised but not implemented.
    #[error("{operation} is not supported")]
    Unsupported {
        /// Name of the unsupported path or operation.
        operation: String,
    },

    /// The request could not be transferred out of the caller's buffer.
    #[error("fault reading request: {reason}")]
    Fault {
        /// Description of the failed transfer.
        reason: String,
    },

    /// A provider handler failed with its own status.
    #[error("handler failed with status {status}: {message}")]
    Handler {
        /// Provider-defined status, passed back verbatim.
        status: i32,
        /// Human-readable description.
        message: String,
    },
}

impl DispatchError {
    /// Returns the taxonomy class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::NamespaceNotFound { .. }
            | Self::NamespaceClosed { .. }
            | Self::HandleNotFound { .. } => ErrorKind::NotFound,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::OwnershipMismatch { .. } => ErrorKind::OwnershipMismatch,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::NoSuchOperation { .. } => ErrorKind::NoSuchOperation,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Fault { .. } => ErrorKind::Fault,
            Self::Handler { .. } => ErrorKind::Handler,
        }
    }

    /// Returns the conventional status code for this error.
    ///
    /// Type and ownership mismatches report `ENOENT`, the same as a missing
    /// handle. Handler failures return the provider's own status unchanged.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidRequest { .. } => errno::EINVAL,
            Self::NamespaceNotFound { .. }
            | Self::HandleNotFound { .. }
            | Self::TypeMismatch { .. }
            | Self::OwnershipMismatch { .. } => errno::ENOENT,
            Self::NamespaceClosed { .. } => errno::ENODEV,
            Self::Busy { .. } => errno::EBUSY,
            Self::ResourceExhausted { .. } => errno::ENOMEM,
            Self::NoSuchOperation { .. } | Self::Unsupported { .. } => errno::ENOSYS,
            Self::Fault { .. } => errno::EFAULT,
            Self::Handler { status, .. } => *status,
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-path error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a fault error.
    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Fault {
            reason: reason.into(),
        }
    }

    /// Creates a handler failure carrying a provider status.
    pub fn handler(status: i32, message: impl Into<String>) -> Self {
        Self::Handler {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests;
