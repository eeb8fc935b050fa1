//! Binary layout of a control call.
//!
//! A request is a 16-byte header followed by object-id slots, argument
//! descriptors, and finally the attribute bytes the descriptors point at. All
//! integers are little-endian. Every fixed-size record is eight bytes, so the
//! structural size of a request is `HEADER_LEN + (objects + args) * SLOT_LEN`.

#![expect(
    clippy::little_endian_bytes,
    reason = "the control-call layout is little-endian on every host"
)]

use std::ops::Range;

/// Size of the request header in bytes.
pub const HEADER_LEN: usize = 16;
/// Size of one object-id slot or argument descriptor in bytes.
pub const SLOT_LEN: usize = 8;
/// Maximum number of namespaces registered at once.
pub const MAX_NAMESPACES: usize = 64;
/// Number of operation codes reserved for each namespace.
pub const OP_RANGE: u32 = 128;
/// Maximum length of a namespace display name in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Command number of the structured control call.
pub const STRUCTURED_COMMAND: u8 = 3;
/// Bit marking a command as an unstructured (raw) call.
pub const RAW_COMMAND_FLAG: u8 = 0x80;
/// Mask selecting the command number without the raw bit.
pub const COMMAND_MASK: u8 = 0x7F;

/// Length of the session-context attribute consumed by opening operations.
pub const SESSION_CONTEXT_LEN: u16 = 8;
/// Length of an I/O vector attribute.
pub const IOVEC_LEN: u16 = 16;

/// Well-known attribute ids carried in argument descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AttributeId {
    /// Provider-specific attribute.
    Raw = 0,
    /// `{u64 address, u64 length}` buffer descriptor.
    Iovec = 1,
    /// Embedded object id.
    ObjectId = 2,
    /// Application context of a newly opened object.
    SessionContext = 3,
    /// Namespace attribute record.
    NamespaceAttr = 4,
}

impl AttributeId {
    /// Returns the numeric attribute id.
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }
}

/// Command number selecting the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The structured control call.
    Structured,
    /// An unstructured call; the payload is the low seven bits.
    Raw(u8),
    /// Any other command number.
    Unknown(u8),
}

impl Command {
    /// Classifies a raw command number.
    #[must_use]
    pub const fn decode(number: u8) -> Self {
        if number & RAW_COMMAND_FLAG != 0 {
            Self::Raw(number & COMMAND_MASK)
        } else if number == STRUCTURED_COMMAND {
            Self::Structured
        } else {
            Self::Unknown(number)
        }
    }
}

/// Fixed-size request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Target namespace id.
    pub namespace: u16,
    /// Declared total length of the request, header included.
    pub length: u16,
    /// Operation code.
    pub op: u32,
    /// Caller flags, interpreted by the operation.
    pub flags: u32,
    /// Number of object-id slots.
    pub object_count: u8,
    /// Number of argument descriptors.
    pub argument_count: u8,
    /// Reserved; must be zero.
    pub reserved: u16,
}

impl Header {
    /// Decodes the header from the front of `bytes`.
    ///
    /// Returns `None` when fewer than [`HEADER_LEN`] bytes are available.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw: &[u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        let [n0, n1, l0, l1, o0, o1, o2, o3, f0, f1, f2, f3, oc, ac, r0, r1] = *raw;
        Some(Self {
            namespace: u16::from_le_bytes([n0, n1]),
            length: u16::from_le_bytes([l0, l1]),
            op: u32::from_le_bytes([o0, o1, o2, o3]),
            flags: u32::from_le_bytes([f0, f1, f2, f3]),
            object_count: oc,
            argument_count: ac,
            reserved: u16::from_le_bytes([r0, r1]),
        })
    }

    /// Encodes the header into its wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0_u8; HEADER_LEN];
        put(&mut out, 0, &self.namespace.to_le_bytes());
        put(&mut out, 2, &self.length.to_le_bytes());
        put(&mut out, 4, &self.op.to_le_bytes());
        put(&mut out, 8, &self.flags.to_le_bytes());
        put(&mut out, 12, &[self.object_count, self.argument_count]);
        put(&mut out, 14, &self.reserved.to_le_bytes());
        out
    }

    /// Size of the header plus every declared slot and descriptor.
    #[must_use]
    pub const fn structural_len(&self) -> usize {
        HEADER_LEN + (self.object_count as usize + self.argument_count as usize) * SLOT_LEN
    }
}

/// Caller-visible identifier of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// Handle id within the namespace's table.
    pub handle: u32,
    /// Type tag the caller expects the object to carry.
    pub type_tag: u16,
    /// Object-specific data; zero on input.
    pub data: u16,
}

impl ObjectId {
    /// Creates an id with zeroed slot data.
    #[must_use]
    pub const fn new(handle: u32, type_tag: u16) -> Self {
        Self {
            handle,
            type_tag,
            data: 0,
        }
    }

    /// Decodes one slot.
    #[must_use]
    pub fn decode(slot: [u8; SLOT_LEN]) -> Self {
        let [h0, h1, h2, h3, t0, t1, d0, d1] = slot;
        Self {
            handle: u32::from_le_bytes([h0, h1, h2, h3]),
            type_tag: u16::from_le_bytes([t0, t1]),
            data: u16::from_le_bytes([d0, d1]),
        }
    }

    /// Encodes one slot.
    #[must_use]
    pub fn encode(&self) -> [u8; SLOT_LEN] {
        let mut out = [0_u8; SLOT_LEN];
        put(&mut out, 0, &self.handle.to_le_bytes());
        put(&mut out, 4, &self.type_tag.to_le_bytes());
        put(&mut out, 6, &self.data.to_le_bytes());
        out
    }
}

/// Argument descriptor pointing at attribute bytes within the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Argument {
    /// Byte offset from the start of the request.
    pub offset: u16,
    /// Attribute id, see [`AttributeId`].
    pub attr_id: u16,
    /// Length of the attribute in bytes.
    pub length: u16,
    /// Small attribute-specific inline value.
    pub data: u16,
}

impl Argument {
    /// Decodes one descriptor.
    #[must_use]
    pub fn decode(slot: [u8; SLOT_LEN]) -> Self {
        let [o0, o1, a0, a1, l0, l1, d0, d1] = slot;
        Self {
            offset: u16::from_le_bytes([o0, o1]),
            attr_id: u16::from_le_bytes([a0, a1]),
            length: u16::from_le_bytes([l0, l1]),
            data: u16::from_le_bytes([d0, d1]),
        }
    }

    /// Encodes one descriptor.
    #[must_use]
    pub fn encode(&self) -> [u8; SLOT_LEN] {
        let mut out = [0_u8; SLOT_LEN];
        put(&mut out, 0, &self.offset.to_le_bytes());
        put(&mut out, 2, &self.attr_id.to_le_bytes());
        put(&mut out, 4, &self.length.to_le_bytes());
        put(&mut out, 6, &self.data.to_le_bytes());
        out
    }

    /// Byte range the argument covers, measured from the start of the request.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }

    /// Returns true when the descriptor has the given attribute id and length.
    #[must_use]
    pub const fn is(&self, attr: AttributeId, length: u16) -> bool {
        self.attr_id == attr.id() && self.length == length
    }
}

/// Reads the slot at `index` from the region starting at `base`.
pub(crate) fn slot_at(bytes: &[u8], base: usize, index: usize) -> Option<[u8; SLOT_LEN]> {
    let start = base + index * SLOT_LEN;
    bytes.get(start..start + SLOT_LEN)?.try_into().ok()
}

/// Decodes a little-endian `u64` from exactly eight bytes.
pub(crate) fn read_u64(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

/// Encodes a `u64` in wire byte order.
pub(crate) const fn u64_bytes(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

fn put<const N: usize>(out: &mut [u8; N], at: usize, value: &[u8]) {
    if let Some(target) = out.get_mut(at..at + value.len()) {
        target.copy_from_slice(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_field_offsets() {
        let header = Header {
            namespace: 0x0102,
            length: 0x0304,
            op: 0x0506_0708,
            flags: 0x090A_0B0C,
            object_count: 0x0D,
            argument_count: 0x0E,
            reserved: 0,
        };
        let bytes = header.encode();
        assert_eq!(
            bytes,
            [
                0x02, 0x01, 0x04, 0x03, 0x08, 0x07, 0x06, 0x05, 0x0C, 0x0B, 0x0A, 0x09, 0x0D,
                0x0E, 0, 0
            ]
        );
        assert_eq!(Header::decode(&bytes), Some(header));
    }

    #[test]
    fn header_decode_needs_full_header() {
        assert_eq!(Header::decode(&[0_u8; HEADER_LEN - 1]), None);
    }

    #[test]
    fn structural_len_counts_both_slot_kinds() {
        let header = Header {
            namespace: 0,
            length: 0,
            op: 0,
            flags: 0,
            object_count: 2,
            argument_count: 3,
            reserved: 0,
        };
        assert_eq!(header.structural_len(), HEADER_LEN + 5 * SLOT_LEN);
    }

    #[test]
    fn argument_range_spans_offset_and_length() {
        let argument = Argument {
            offset: 40,
            attr_id: AttributeId::Raw.id(),
            length: 12,
            data: 0,
        };
        assert_eq!(argument.range(), 40..52);
        assert!(argument.is(AttributeId::Raw, 12));
        assert!(!argument.is(AttributeId::Iovec, 12));
    }

    #[test]
    fn object_id_slot_layout() {
        let id = ObjectId {
            handle: 0xAABB_CCDD,
            type_tag: 0x1122,
            data: 0x3344,
        };
        assert_eq!(
            id.encode(),
            [0xDD, 0xCC, 0xBB, 0xAA, 0x22, 0x11, 0x44, 0x33]
        );
    }

    #[test]
    fn commands_are_classified() {
        assert_eq!(Command::decode(STRUCTURED_COMMAND), Command::Structured);
        assert_eq!(
            Command::decode(RAW_COMMAND_FLAG | 0x05),
            Command::Raw(0x05)
        );
        assert_eq!(Command::decode(7), Command::Unknown(7));
    }
}
