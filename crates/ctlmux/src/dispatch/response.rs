//! Result of a completed control call.

use crate::wire::{self, HEADER_LEN, Header, ObjectId};

/// Handler status plus the request bytes as returned to the caller.
///
/// The bytes carry the final object ids in the slot area, any argument bytes
/// the handler rewrote, and header counts adjusted for an opened object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: i64,
    bytes: Vec<u8>,
}

impl Response {
    pub(crate) const fn new(status: i64, bytes: Vec<u8>) -> Self {
        Self { status, bytes }
    }

    /// Non-negative status returned by the handler.
    #[must_use]
    pub const fn status(&self) -> i64 {
        self.status
    }

    /// Response bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the response, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decoded response header.
    #[must_use]
    pub fn header(&self) -> Option<Header> {
        Header::decode(&self.bytes)
    }

    /// Object ids in the response slot area.
    #[must_use]
    pub fn objects(&self) -> Vec<ObjectId> {
        let count = self
            .header()
            .map_or(0, |header| usize::from(header.object_count));
        (0..count)
            .map_while(|index| wire::slot_at(&self.bytes, HEADER_LEN, index).map(ObjectId::decode))
            .collect()
    }
}
