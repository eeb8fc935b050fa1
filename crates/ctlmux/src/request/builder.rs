//! Composes request buffers in the control-call layout.

use crate::error::DispatchError;
use crate::wire::{self, Argument, AttributeId, HEADER_LEN, Header, ObjectId, SLOT_LEN};

#[derive(Debug, Clone)]
struct PendingArgument {
    attr_id: u16,
    data: u16,
    bytes: Vec<u8>,
}

/// Builder producing a request buffer.
///
/// Attribute bytes are packed after the argument descriptors in the order the
/// arguments were added.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    namespace: u16,
    op: u32,
    flags: u32,
    objects: Vec<ObjectId>,
    arguments: Vec<PendingArgument>,
}

impl RequestBuilder {
    /// Starts a request for `op` in `namespace`.
    #[must_use]
    pub const fn new(namespace: u16, op: u32) -> Self {
        Self {
            namespace,
            op,
            flags: 0,
            objects: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Sets the caller flags.
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Names an object.
    #[must_use]
    pub fn object(mut self, id: ObjectId) -> Self {
        self.objects.push(id);
        self
    }

    /// Adds the session-context argument of an opening operation.
    ///
    /// Opening operations read it from the first argument position, so add it
    /// before any other argument.
    #[must_use]
    pub fn session_context(self, type_tag: u16, app_context: u64) -> Self {
        self.argument(
            AttributeId::SessionContext,
            type_tag,
            wire::u64_bytes(app_context),
        )
    }

    /// Adds an argument with a well-known attribute id.
    #[must_use]
    pub fn argument(self, attr: AttributeId, data: u16, bytes: impl Into<Vec<u8>>) -> Self {
        self.raw_argument(attr.id(), data, bytes)
    }

    /// Adds an argument with any attribute id.
    #[must_use]
    pub fn raw_argument(mut self, attr_id: u16, data: u16, bytes: impl Into<Vec<u8>>) -> Self {
        self.arguments.push(PendingArgument {
            attr_id,
            data,
            bytes: bytes.into(),
        });
        self
    }

    /// Lays out the request.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidRequest`] when the object or argument
    /// count exceeds 255 or the request would not fit a 16-bit length.
    pub fn build(self) -> Result<Vec<u8>, DispatchError> {
        let object_count = u8::try_from(self.objects.len())
            .map_err(|_| DispatchError::invalid_request("more than 255 objects"))?;
        let argument_count = u8::try_from(self.arguments.len())
            .map_err(|_| DispatchError::invalid_request("more than 255 arguments"))?;
        let too_long = || DispatchError::invalid_request("request exceeds 65535 bytes");

        let structural = HEADER_LEN + (self.objects.len() + self.arguments.len()) * SLOT_LEN;
        let payload: usize = self.arguments.iter().map(|argument| argument.bytes.len()).sum();
        let length = u16::try_from(structural + payload).map_err(|_| too_long())?;

        let header = Header {
            namespace: self.namespace,
            length,
            op: self.op,
            flags: self.flags,
            object_count,
            argument_count,
            reserved: 0,
        };
        let mut out = Vec::with_capacity(usize::from(length));
        out.extend_from_slice(&header.encode());
        for id in &self.objects {
            out.extend_from_slice(&id.encode());
        }

        let mut offset = structural;
        for pending in &self.arguments {
            let descriptor = Argument {
                offset: u16::try_from(offset).map_err(|_| too_long())?,
                attr_id: pending.attr_id,
                length: u16::try_from(pending.bytes.len()).map_err(|_| too_long())?,
                data: pending.data,
            };
            out.extend_from_slice(&descriptor.encode());
            offset += pending.bytes.len();
        }
        for pending in &self.arguments {
            out.extend_from_slice(&pending.bytes);
        }
        Ok(out)
    }
}
