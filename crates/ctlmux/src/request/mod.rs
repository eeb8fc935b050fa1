//! Validated control-call requests.
//!
//! [`Request::parse`] copies the caller's buffer and checks its structure
//! before anything else looks at it. [`Request::admit`] then applies the rules
//! that depend on the resolved operation.

mod builder;

pub use builder::RequestBuilder;

use crate::error::DispatchError;
use crate::namespace::OperationFlags;
use crate::wire::{
    self, Argument, AttributeId, HEADER_LEN, Header, ObjectId, SESSION_CONTEXT_LEN, SLOT_LEN,
};

/// Session-context attribute consumed by an opening operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenArgument {
    /// Type tag of the object to create.
    pub type_tag: u16,
    /// Application context stored with the object.
    pub app_context: u64,
}

/// Outcome of [`Request::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    open: Option<OpenArgument>,
}

impl Admission {
    /// Session context to open with, when the operation creates an object.
    #[must_use]
    pub const fn open(&self) -> Option<OpenArgument> {
        self.open
    }

    /// Index of the first argument handed to the operation.
    #[must_use]
    pub const fn first_argument(&self) -> usize {
        if self.open.is_some() { 1 } else { 0 }
    }
}

/// Structurally valid copy of a caller's request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    header: Header,
    bytes: Vec<u8>,
    objects: Vec<ObjectId>,
    arguments: Vec<Argument>,
}

impl Request {
    /// Copies and validates a request.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Fault`] if the buffer cannot hold the header or is
    ///   shorter than the length the header declares.
    /// - [`DispatchError::InvalidRequest`] if the reserved field is set, the
    ///   declared slots and descriptors do not fit the declared length, an
    ///   object slot carries data, or an argument reaches past the end.
    pub fn parse(buffer: &[u8]) -> Result<Self, DispatchError> {
        let header = Header::decode(buffer).ok_or_else(|| {
            DispatchError::fault(format!(
                "{} byte buffer cannot hold a {HEADER_LEN} byte header",
                buffer.len()
            ))
        })?;
        if header.reserved != 0 {
            return Err(DispatchError::invalid_request(
                "reserved header field is not zero",
            ));
        }
        let declared = usize::from(header.length);
        if header.structural_len() > declared {
            return Err(DispatchError::invalid_request(format!(
                "{} objects and {} arguments need {} bytes but the request declares {declared}",
                header.object_count,
                header.argument_count,
                header.structural_len()
            )));
        }
        let bytes = buffer
            .get(..declared)
            .ok_or_else(|| {
                DispatchError::fault(format!(
                    "request declares {declared} bytes but only {} are readable",
                    buffer.len()
                ))
            })?
            .to_vec();

        let objects = decode_slots(&bytes, HEADER_LEN, header.object_count, ObjectId::decode)?;
        if let Some(slot) = objects.iter().find(|id| id.data != 0) {
            return Err(DispatchError::invalid_request(format!(
                "object slot for handle {} carries data",
                slot.handle
            )));
        }
        let descriptors_at = HEADER_LEN + objects.len() * SLOT_LEN;
        let arguments = decode_slots(
            &bytes,
            descriptors_at,
            header.argument_count,
            Argument::decode,
        )?;

        let request = Self {
            header,
            bytes,
            objects,
            arguments,
        };
        request.check_bounds()?;
        Ok(request)
    }

    // Every argument must lie within the declared length.
    fn check_bounds(&self) -> Result<(), DispatchError> {
        let total = self.bytes.len();
        for (index, argument) in self.arguments.iter().enumerate() {
            let range = argument.range();
            if range.end > total {
                return Err(DispatchError::invalid_request(format!(
                    "argument {index} spans {}..{} beyond the {total} byte request",
                    range.start, range.end
                )));
            }
        }
        Ok(())
    }

    /// Applies the rules that depend on the operation's flags.
    ///
    /// A destroying operation must name exactly one object and is admitted
    /// even when the namespace is closed. Everything else is refused by a
    /// closed namespace. A creating operation must lead with an eight-byte
    /// session-context argument; its `data` field is the type tag of the new
    /// object and its bytes are the application context.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidRequest`] when the object count or leading
    ///   argument is wrong for the operation.
    /// - [`DispatchError::NamespaceClosed`] when the namespace only accepts
    ///   close operations.
    pub fn admit(
        &self,
        flags: OperationFlags,
        namespace_closed: bool,
    ) -> Result<Admission, DispatchError> {
        if flags.contains(OperationFlags::DESTROYS) {
            if self.objects.len() != 1 {
                return Err(DispatchError::invalid_request(format!(
                    "a destroying operation names exactly one object, not {}",
                    self.objects.len()
                )));
            }
        } else if namespace_closed {
            return Err(DispatchError::NamespaceClosed {
                namespace: self.header.namespace,
            });
        }

        let open = if flags.contains(OperationFlags::CREATES) {
            Some(self.open_argument()?)
        } else {
            None
        };
        Ok(Admission { open })
    }

    fn open_argument(&self) -> Result<OpenArgument, DispatchError> {
        if self.header.object_count == u8::MAX {
            return Err(DispatchError::invalid_request(
                "no slot is left for the created object",
            ));
        }
        let leading = self
            .arguments
            .first()
            .filter(|argument| argument.is(AttributeId::SessionContext, SESSION_CONTEXT_LEN))
            .ok_or_else(|| {
                DispatchError::invalid_request(
                    "an opening operation must lead with a session-context argument",
                )
            })?;
        let app_context = self
            .bytes
            .get(leading.range())
            .and_then(wire::read_u64)
            .ok_or_else(|| DispatchError::invalid_request("session context is truncated"))?;
        Ok(OpenArgument {
            type_tag: leading.data,
            app_context,
        })
    }

    /// Decoded header.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Target namespace id.
    #[must_use]
    pub const fn namespace_id(&self) -> u16 {
        self.header.namespace
    }

    /// Operation code.
    #[must_use]
    pub const fn op(&self) -> u32 {
        self.header.op
    }

    /// Caller flags.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.header.flags
    }

    /// Object ids named by the caller.
    #[must_use]
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Every argument descriptor, including a leading session context.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Bytes of the argument at `index`.
    #[must_use]
    pub fn argument_bytes(&self, index: usize) -> Option<&[u8]> {
        let argument = self.arguments.get(index)?;
        self.bytes.get(argument.range())
    }

    pub(crate) fn argument_bytes_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let argument = self.arguments.get(index)?;
        self.bytes.get_mut(argument.range())
    }

    /// The validated request bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes the final object ids back into the slot area.
    ///
    /// When the operation opened an object, its id is the last entry of
    /// `slots`. It lands in the slot after the caller's objects, which is
    /// where the consumed session-context descriptor sat, and the header
    /// counts are adjusted to match.
    pub(crate) fn reflect(&mut self, slots: &[ObjectId], opened: bool) {
        for (index, id) in slots.iter().enumerate() {
            let start = HEADER_LEN + index * SLOT_LEN;
            if let Some(target) = self.bytes.get_mut(start..start + SLOT_LEN) {
                target.copy_from_slice(&id.encode());
            }
        }
        if opened {
            let mut header = self.header;
            header.object_count = header.object_count.saturating_add(1);
            header.argument_count = header.argument_count.saturating_sub(1);
            if let Some(target) = self.bytes.get_mut(..HEADER_LEN) {
                target.copy_from_slice(&header.encode());
            }
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn decode_slots<T>(
    bytes: &[u8],
    base: usize,
    count: u8,
    decode: fn([u8; SLOT_LEN]) -> T,
) -> Result<Vec<T>, DispatchError> {
    (0..usize::from(count))
        .map(|index| {
            wire::slot_at(bytes, base, index)
                .map(decode)
                .ok_or_else(|| DispatchError::invalid_request("request slots are truncated"))
        })
        .collect()
}
